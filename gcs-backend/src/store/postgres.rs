use super::{StoreResult, TelemetryStore};
use crate::errors::PersistenceError;
use crate::model::{Sample, StoredSample, TimeRange};
use crate::validate::validate;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        info!("Database connection established");
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations completed");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn append(&self, sample: &Sample) -> StoreResult<StoredSample> {
        validate(sample).map_err(|e| PersistenceError::Constraint(e.to_string()))?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO telemetry (id, temperature, pressure, altitude, latitude, longitude, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(sample.temperature)
        .bind(sample.pressure)
        .bind(sample.altitude)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(StoredSample {
            id,
            sample: sample.clone(),
        })
    }

    async fn query_range(&self, range: &TimeRange, limit: usize) -> StoreResult<Vec<StoredSample>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT id, temperature, pressure, altitude, latitude, longitude, ts FROM telemetry",
        );

        let mut separator = " WHERE ";
        if let Some(start) = range.start {
            query.push(separator).push("ts >= ").push_bind(start);
            separator = " AND ";
        }
        if let Some(end) = range.end {
            query.push(separator).push("ts <= ").push_bind(end);
        }

        query
            .push(" ORDER BY ts DESC, seq DESC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query
            .build_query_as::<StoredSample>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}
