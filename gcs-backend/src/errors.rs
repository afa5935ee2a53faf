use std::time::Duration;
use thiserror::Error;

use crate::broadcast::SubscriberId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to write or read the telemetry store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_error(&err) {
            return PersistenceError::Unavailable(err);
        }
        let constraint = match &err {
            // class 23: integrity_constraint_violation
            sqlx::Error::Database(db_err)
                if db_err.code().is_some_and(|code| code.starts_with("23")) =>
            {
                Some(db_err.message().to_string())
            }
            _ => None,
        };
        match constraint {
            Some(message) => PersistenceError::Constraint(message),
            None => PersistenceError::Database(err),
        }
    }
}

/// Rejected input on the request/response boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid '{field}' bound '{value}': expected an ISO-8601 instant")]
    MalformedBound { field: &'static str, value: String },

    #[error("invalid query string: {0}")]
    MalformedQuery(String),

    #[error("invalid limit '{0}': must be an integer between 1 and {max}", max = crate::model::MAX_QUERY_LIMIT)]
    Limit(String),

    #[error("{field} {value} is not finite")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Failure to hand a sample to one subscriber. Never affects other subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber {0} is lagging, sample dropped")]
    Lagging(SubscriberId),

    #[error("subscriber {0} disconnected")]
    Disconnected(SubscriberId),
}

pub type Result<T> = std::result::Result<T, Error>;

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Check if it's a connection-related error
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err = PersistenceError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, PersistenceError::Unavailable(_)));
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = PersistenceError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, PersistenceError::Database(_)));
    }

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::MalformedBound {
            field: "start",
            value: "yesterday".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid 'start' bound 'yesterday': expected an ISO-8601 instant"
        );
        assert_eq!(
            ValidationError::Limit("0".to_string()).to_string(),
            "invalid limit '0': must be an integer between 1 and 500"
        );
    }
}
