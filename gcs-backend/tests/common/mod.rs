#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use gcs_backend::broadcast::Broadcaster;
use gcs_backend::model::Sample;
use gcs_backend::store::{MemoryStore, TelemetryStore};
use gcs_backend::{build_app, cors_layer, AppState};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

pub const DASHBOARD_ORIGIN: &str = "http://localhost:3000";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub broadcaster: Arc<Broadcaster>,
}

pub fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Broadcaster::new(16);
    let cors = cors_layer(DASHBOARD_ORIGIN).unwrap();
    let router = build_app(AppState::new(store.clone(), broadcaster.clone()), cors);
    TestApp {
        router,
        store,
        broadcaster,
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 25, 6, 0, 0).unwrap()
}

pub fn sample_at(offset_secs: i64, temperature: f64) -> Sample {
    Sample {
        temperature,
        pressure: 1003.5,
        altitude: 215.25,
        latitude: 12.97185,
        longitude: 77.59512,
        timestamp: t0() + Duration::seconds(offset_secs),
    }
}

/// Appends samples at t0+0s, +5s, +10s with temperatures 21, 22, 23.
pub async fn seed_three(store: &MemoryStore) {
    for (offset, temp) in [(0, 21.0), (5, 22.0), (10, 23.0)] {
        store.append(&sample_at(offset, temp)).await.unwrap();
    }
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_body(resp).await
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn read_body(resp: Response) -> (StatusCode, Vec<u8>) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    (status, bytes.to_vec())
}
