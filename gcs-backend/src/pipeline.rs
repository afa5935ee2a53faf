use crate::broadcast::{Broadcaster, DeliveryReport};
use crate::errors::PersistenceError;
use crate::generator::ReadingGenerator;
use crate::metrics::{
    APPEND_LATENCY_SECONDS, SAMPLES_DROPPED_TOTAL, SAMPLES_GENERATED_TOTAL,
    SAMPLES_PERSISTED_TOTAL,
};
use crate::model::StoredSample;
use crate::store::SharedStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What happened to the sample generated on one tick.
#[derive(Debug)]
pub enum TickOutcome {
    Published {
        sample: Arc<StoredSample>,
        report: DeliveryReport,
    },
    Dropped(PersistenceError),
}

/// Generate → persist → broadcast, one sample at a time.
pub struct TelemetryPipeline {
    generator: ReadingGenerator,
    store: SharedStore,
    broadcaster: Arc<Broadcaster>,
}

impl TelemetryPipeline {
    pub fn new(generator: ReadingGenerator, store: SharedStore, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            generator,
            store,
            broadcaster,
        }
    }

    /// Runs a single generation cycle. Unpersisted samples are never broadcast.
    pub async fn tick(&mut self) -> TickOutcome {
        let sample = self.generator.next_sample();
        SAMPLES_GENERATED_TOTAL.inc();

        let start = Instant::now();
        let stored = match self.store.append(&sample).await {
            Ok(stored) => stored,
            Err(e) => {
                SAMPLES_DROPPED_TOTAL.inc();
                error!("Failed to persist telemetry sample, dropping it: {}", e);
                return TickOutcome::Dropped(e);
            }
        };
        APPEND_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        SAMPLES_PERSISTED_TOTAL.inc();

        let sample = Arc::new(stored);
        let report = self.broadcaster.publish(Arc::clone(&sample));
        if !report.is_skipped() {
            debug!(
                id = %sample.id,
                delivered = report.delivered,
                failed = report.failures.len(),
                "Sent telemetry"
            );
        }

        TickOutcome::Published { sample, report }
    }

    /// Spawns the generation loop on the current runtime.
    pub fn start(self, period: Duration) -> PipelineHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_pipeline(self, period, shutdown.clone()));
        PipelineHandle { shutdown, task }
    }
}

async fn run_pipeline(mut pipeline: TelemetryPipeline, period: Duration, shutdown: CancellationToken) {
    info!("Starting telemetry generation every {:?}", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                pipeline.tick().await;
            }
        }
    }

    info!("Telemetry generation stopped");
}

/// Owns the running generation task.
pub struct PipelineHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop after the tick in progress, if any, and waits for it.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("Telemetry task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorConfig;
    use crate::model::{Sample, TimeRange};
    use crate::store::{MemoryStore, StoreResult, TelemetryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline_with(store: SharedStore, broadcaster: Arc<Broadcaster>) -> TelemetryPipeline {
        TelemetryPipeline::new(
            ReadingGenerator::seeded(GeneratorConfig::default(), 11),
            store,
            broadcaster,
        )
    }

    /// Fails every other append.
    struct FlakyStore {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetryStore for FlakyStore {
        async fn append(&self, sample: &Sample) -> StoreResult<StoredSample> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                return Err(PersistenceError::Unavailable(sqlx::Error::PoolTimedOut));
            }
            self.inner.append(sample).await
        }

        async fn query_range(&self, range: &TimeRange, limit: usize) -> StoreResult<Vec<StoredSample>> {
            self.inner.query_range(range, limit).await
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_still_persisted() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Broadcaster::new(4);
        let mut pipeline = pipeline_with(store.clone(), broadcaster);

        let TickOutcome::Published { sample, report } = pipeline.tick().await else {
            panic!("expected sample to be persisted");
        };
        assert!(report.is_skipped());

        let rows = store.query_range(&TimeRange::unbounded(), 500).await.unwrap();
        assert_eq!(rows, vec![(*sample).clone()]);
    }

    #[tokio::test]
    async fn test_subscriber_receives_persisted_sample() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let mut pipeline = pipeline_with(store.clone(), broadcaster);

        let TickOutcome::Published { sample, report } = pipeline.tick().await else {
            panic!("expected sample to be persisted");
        };
        assert_eq!(report.delivered, 1);

        let pushed = sub.try_recv().unwrap();
        assert_eq!(pushed.id, sample.id);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failed_append_is_not_broadcast() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
        });
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let mut pipeline = pipeline_with(store.clone(), broadcaster);

        assert!(matches!(pipeline.tick().await, TickOutcome::Dropped(_)));
        assert!(sub.try_recv().is_none());

        assert!(matches!(pipeline.tick().await, TickOutcome::Published { .. }));
        assert!(sub.try_recv().is_some());

        let rows = store.query_range(&TimeRange::unbounded(), 500).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_loop_ticks_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Broadcaster::new(16);
        let mut sub = broadcaster.subscribe();

        let handle = pipeline_with(store.clone(), broadcaster).start(Duration::from_secs(5));
        assert!(handle.is_running());

        // First tick fires immediately, then every 5s.
        for _ in 0..3 {
            sub.recv().await.unwrap();
        }
        handle.stop().await;

        assert_eq!(store.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_persistence_failures() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
        });
        let broadcaster = Broadcaster::new(16);
        let mut sub = broadcaster.subscribe();

        let handle = pipeline_with(store.clone(), broadcaster).start(Duration::from_secs(5));
        sub.recv().await.unwrap();
        sub.recv().await.unwrap();
        handle.stop().await;

        assert!(store.calls.load(Ordering::SeqCst) >= 4);
    }
}
