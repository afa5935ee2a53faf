use super::{StoreResult, TelemetryStore};
use crate::errors::PersistenceError;
use crate::model::{Sample, StoredSample, TimeRange};
use crate::validate::validate;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store. Rows live as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<StoredSample>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn append(&self, sample: &Sample) -> StoreResult<StoredSample> {
        validate(sample).map_err(|e| PersistenceError::Constraint(e.to_string()))?;

        let stored = StoredSample {
            id: Uuid::new_v4(),
            sample: sample.clone(),
        };
        self.rows.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn query_range(&self, range: &TimeRange, limit: usize) -> StoreResult<Vec<StoredSample>> {
        let rows = self.rows.read().await;

        // Newest insertion first, so the stable sort keeps later rows ahead on equal timestamps.
        let mut matched: Vec<&StoredSample> = rows
            .iter()
            .rev()
            .filter(|row| range.contains(&row.sample.timestamp))
            .collect();
        matched.sort_by(|a, b| b.sample.timestamp.cmp(&a.sample.timestamp));

        Ok(matched.into_iter().take(limit).cloned().collect())
    }
}
