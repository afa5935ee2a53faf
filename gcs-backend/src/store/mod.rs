//! Append-only telemetry storage.
//!
//! Two backends implement [`TelemetryStore`]: [`PgStore`] for the deployed
//! service and [`MemoryStore`] for tests and database-less runs. Both return
//! range queries newest first, breaking timestamp ties by insertion order.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::errors::PersistenceError;
use crate::model::{Sample, StoredSample, TimeRange};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub type StoreResult<T> = std::result::Result<T, PersistenceError>;

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Persists one sample and returns it with its assigned identifier.
    async fn append(&self, sample: &Sample) -> StoreResult<StoredSample>;

    /// Samples inside `range`, newest first, at most `limit` of them.
    async fn query_range(&self, range: &TimeRange, limit: usize) -> StoreResult<Vec<StoredSample>>;
}

pub type SharedStore = Arc<dyn TelemetryStore>;

/// Wraps a store so every call gives up after `timeout`.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| PersistenceError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl<S: TelemetryStore> TelemetryStore for TimeoutStore<S> {
    async fn append(&self, sample: &Sample) -> StoreResult<StoredSample> {
        self.bounded(self.inner.append(sample)).await
    }

    async fn query_range(&self, range: &TimeRange, limit: usize) -> StoreResult<Vec<StoredSample>> {
        self.bounded(self.inner.query_range(range, limit)).await
    }
}
