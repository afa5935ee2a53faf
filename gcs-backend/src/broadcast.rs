//! Live fan-out of persisted samples.
//!
//! Each subscriber owns a bounded queue. [`Broadcaster::publish`] offers the
//! sample to every queue with `try_send`, so a slow or vanished subscriber
//! only ever loses its own copy. Dropping a [`Subscription`] removes it from
//! the registry; there is no replay for late joiners.

use crate::errors::DeliveryError;
use crate::metrics::{DELIVERIES_TOTAL, DELIVERY_FAILURES_TOTAL, SUBSCRIBERS};
use crate::model::StoredSample;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of a single publish.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failures: Vec<DeliveryError>,
}

impl DeliveryReport {
    /// True when nobody was subscribed and delivery was skipped.
    pub fn is_skipped(&self) -> bool {
        self.delivered == 0 && self.failures.is_empty()
    }
}

type Registry = HashMap<SubscriberId, mpsc::Sender<Arc<StoredSample>>>;

#[derive(Debug)]
pub struct Broadcaster {
    subscribers: Mutex<Registry>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    /// `buffer` is the number of undelivered samples a subscriber may queue
    /// before further samples are dropped for it.
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);

        let count = {
            let mut subscribers = self.registry();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        SUBSCRIBERS.set(count as f64);
        debug!(subscriber = %id, subscribers = count, "Subscriber connected");

        Subscription {
            id,
            rx,
            broadcaster: Arc::clone(self),
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let (removed, count) = {
            let mut subscribers = self.registry();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            SUBSCRIBERS.set(count as f64);
            debug!(subscriber = %id, subscribers = count, "Subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    /// Offers `sample` to every current subscriber without waiting on any of them.
    pub fn publish(&self, sample: Arc<StoredSample>) -> DeliveryReport {
        let snapshot: Vec<(SubscriberId, mpsc::Sender<Arc<StoredSample>>)> = self
            .registry()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        if snapshot.is_empty() {
            debug!("No subscribers, skipping delivery");
            return report;
        }

        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(&sample)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %id, "Subscriber queue full, dropping sample");
                    report.failures.push(DeliveryError::Lagging(id));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, "Subscriber gone during delivery");
                    self.unsubscribe(id);
                    report.failures.push(DeliveryError::Disconnected(id));
                }
            }
        }

        DELIVERIES_TOTAL.inc_by(report.delivered as f64);
        DELIVERY_FAILURES_TOTAL.inc_by(report.failures.len() as f64);
        report
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // The map stays consistent even if a holder panicked.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscriber's receiving end. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<StoredSample>>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<StoredSample>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<StoredSample>> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<StoredSample>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
