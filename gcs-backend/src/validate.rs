use crate::errors::ValidationError;
use crate::model::{Sample, MAX_QUERY_LIMIT};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const LATITUDE_MIN: f64 = -90.0;
const LATITUDE_MAX: f64 = 90.0;
const LONGITUDE_MIN: f64 = -180.0;
const LONGITUDE_MAX: f64 = 180.0;

/// Checks the invariants every persisted sample must hold.
pub fn validate(sample: &Sample) -> Result<(), ValidationError> {
    let fields = [
        ("temperature", sample.temperature),
        ("pressure", sample.pressure),
        ("altitude", sample.altitude),
        ("latitude", sample.latitude),
        ("longitude", sample.longitude),
    ];
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field, value });
        }
    }

    check_range("latitude", sample.latitude, LATITUDE_MIN, LATITUDE_MAX)?;
    check_range("longitude", sample.longitude, LONGITUDE_MIN, LONGITUDE_MAX)?;

    Ok(())
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Parses an optional range-query bound.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM[:SS[.fff]]` (read as UTC, the
/// shape a `datetime-local` input sends) or a bare date (midnight UTC). Blank
/// input means "no bound".
pub fn parse_bound(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(naive.and_utc()));
    }

    Err(ValidationError::MalformedBound {
        field,
        value: raw.to_string(),
    })
}

/// Resolves the requested row cap, defaulting to the maximum.
pub fn parse_limit(raw: Option<&str>) -> Result<usize, ValidationError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(MAX_QUERY_LIMIT),
        Some(raw) => raw,
    };
    match raw.parse::<usize>() {
        Ok(n) if (1..=MAX_QUERY_LIMIT).contains(&n) => Ok(n),
        _ => Err(ValidationError::Limit(raw.to_string())),
    }
}
