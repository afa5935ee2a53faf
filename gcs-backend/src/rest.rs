use crate::broadcast::Broadcaster;
use crate::errors::{Error, PersistenceError, ValidationError};
use crate::metrics::{RANGE_QUERIES_REJECTED_TOTAL, RANGE_QUERIES_TOTAL};
use crate::model::{StoredSample, TimeRange};
use crate::store::SharedStore;
use crate::validate::{parse_bound, parse_limit};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

/// Name of the server-sent event carrying one sample.
pub const TELEMETRY_EVENT: &str = "telemetry";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(store: SharedStore, broadcaster: Arc<Broadcaster>) -> Self {
        Self { store, broadcaster }
    }
}

/// Raw query string; bounds are parsed by hand so bad input gets a JSON 400.
#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    start: Option<String>,
    end: Option<String>,
    limit: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/telemetry/filter", get(filter_telemetry))
        .route("/api/telemetry/stream", get(stream_telemetry))
        .with_state(state)
}

/// Lets the dashboard at `client_url` call the API and open the stream with credentials.
pub fn cors_layer(client_url: &str) -> crate::errors::Result<CorsLayer> {
    let origin = HeaderValue::from_str(client_url.trim_end_matches('/'))
        .map_err(|_| Error::Config(format!("invalid client url '{}'", client_url)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

async fn root() -> &'static str {
    "CanSat GCS backend is running"
}

async fn filter_telemetry(
    State(state): State<AppState>,
    params: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<Vec<StoredSample>>, AppError> {
    let Query(params) =
        params.map_err(|rejection| ValidationError::MalformedQuery(rejection.body_text()))?;
    let range = TimeRange::new(
        parse_bound("start", params.start.as_deref())?,
        parse_bound("end", params.end.as_deref())?,
    );
    let limit = parse_limit(params.limit.as_deref())?;

    let rows = state.store.query_range(&range, limit).await?;
    RANGE_QUERIES_TOTAL.inc();
    debug!(
        start = ?range.start,
        end = ?range.end,
        limit,
        rows = rows.len(),
        "Served telemetry range query"
    );

    Ok(Json(rows))
}

async fn stream_telemetry(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.broadcaster.subscribe();
    debug!(subscriber = %subscription.id(), "Telemetry stream opened");

    let events = subscription.map(|stored| {
        Event::default()
            .event(TELEMETRY_EVENT)
            .json_data(&stored.sample)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}

pub enum AppError {
    Validation(ValidationError),
    Persistence(PersistenceError),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        AppError::Persistence(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(e) => {
                RANGE_QUERIES_REJECTED_TOTAL.inc();
                debug!("Rejected range query: {}", e);
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Persistence(e) => {
                error!("Telemetry filter error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to fetch telemetry data".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
