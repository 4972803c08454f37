//! In-process publish/subscribe bus.
//!
//! `LocalBus` keeps one `broadcast` channel per topic and one delivery task per
//! subscription. Each task owns its handler and a child of the bus's root
//! `CancellationToken`, so unsubscribing (or shutting the whole bus down) stops
//! delivery deterministically: the task is cancelled and awaited before
//! `unsubscribe` returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chatrelay_types::error::BusError;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Delivery, DeliveryHandler, PubSub, SubscriptionId};

/// Default per-topic broadcast buffer.
pub const DEFAULT_BUFFER: usize = 1024;

/// Snapshot of bus activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusStats {
    pub topics: usize,
    pub active_subscriptions: usize,
    pub subscribed_total: u64,
    pub unsubscribed_total: u64,
}

struct ActiveSubscription {
    topic: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Process-scoped in-memory bus.
///
/// Create once at startup, share behind an `Arc`, and call
/// [`PubSub::shutdown`] on exit.
pub struct LocalBus {
    /// Per-topic broadcast senders (topic -> sender).
    topics: DashMap<String, broadcast::Sender<Delivery>>,
    /// Live subscriptions (id -> delivery task).
    subscriptions: DashMap<SubscriptionId, ActiveSubscription>,
    buffer: usize,
    root: CancellationToken,
    closed: AtomicBool,
    subscribed_total: AtomicU64,
    unsubscribed_total: AtomicU64,
}

impl LocalBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            topics: DashMap::new(),
            subscriptions: DashMap::new(),
            buffer: buffer.max(1),
            root: CancellationToken::new(),
            closed: AtomicBool::new(false),
            subscribed_total: AtomicU64::new(0),
            unsubscribed_total: AtomicU64::new(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            topics: self.topics.len(),
            active_subscriptions: self.subscriptions.len(),
            subscribed_total: self.subscribed_total.load(Ordering::SeqCst),
            unsubscribed_total: self.unsubscribed_total.load(Ordering::SeqCst),
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl PubSub for LocalBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let Some(sender) = self.topics.get(topic) else {
            debug!(%topic, "no subscribers, message dropped");
            return Ok(0);
        };

        let delivery = Delivery {
            topic: topic.to_string(),
            payload,
        };
        match sender.send(delivery) {
            Ok(count) => {
                debug!(%topic, count, "published message");
                Ok(count)
            }
            Err(_) => {
                debug!(%topic, "no active receivers, message dropped");
                Ok(0)
            }
        }
    }

    async fn subscribe<H: DeliveryHandler>(
        &self,
        topic: &str,
        handler: H,
    ) -> Result<SubscriptionId, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        // The receiver exists before this call returns, so a publish issued
        // right after subscribing is delivered.
        let rx = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe();

        let id = SubscriptionId::new();
        let cancel = self.root.child_token();
        let task = tokio::spawn(run_subscription(
            id,
            topic.to_string(),
            rx,
            handler,
            cancel.clone(),
        ));

        self.subscriptions.insert(
            id,
            ActiveSubscription {
                topic: topic.to_string(),
                cancel,
                task,
            },
        );
        self.subscribed_total.fetch_add(1, Ordering::SeqCst);

        // Shutdown may have drained the table between the check above and the insert.
        if self.is_closed() {
            self.unsubscribe(id).await;
            return Err(BusError::Closed);
        }

        debug!(%topic, subscription = %id, "subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let Some((_, sub)) = self.subscriptions.remove(&id) else {
            debug!(subscription = %id, "unsubscribe: already removed");
            return;
        };

        sub.cancel.cancel();
        if let Err(err) = sub.task.await {
            if err.is_panic() {
                warn!(subscription = %id, topic = %sub.topic, "delivery handler panicked");
            }
        }
        self.unsubscribed_total.fetch_add(1, Ordering::SeqCst);

        self.topics
            .remove_if(&sub.topic, |_, tx| tx.receiver_count() == 0);
        debug!(topic = %sub.topic, subscription = %id, "unsubscribed");
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.root.cancel();

        let ids: Vec<SubscriptionId> = self.subscriptions.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unsubscribe(id).await;
        }
        self.topics.clear();
        debug!("bus shut down");
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("topics", &self.topics.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn run_subscription<H: DeliveryHandler>(
    id: SubscriptionId,
    topic: String,
    mut rx: broadcast::Receiver<Delivery>,
    handler: H,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(delivery) => handler.handle(delivery).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(subscription = %id, %topic, skipped, "subscriber lagged, deliveries dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_handler() -> (mpsc::UnboundedSender<Delivery>, mpsc::UnboundedReceiver<Delivery>) {
        mpsc::unbounded_channel()
    }

    /// Counts invocations after sleeping, to observe in-flight deliveries.
    struct SlowCounter {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl DeliveryHandler for SlowCounter {
        async fn handle(&self, _delivery: Delivery) {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_lost() {
        let bus = LocalBus::default();
        let count = bus.publish("nobody", "hello".to_string()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn subscriber_receives_publication() {
        let bus = LocalBus::default();
        let (tx, mut rx) = channel_handler();
        bus.subscribe("news", tx).await.unwrap();

        let count = bus.publish("news", "headline".to_string()).await.unwrap();
        assert_eq!(count, 1);

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.topic, "news");
        assert_eq!(delivery.payload, "headline");
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = LocalBus::default();
        let (tx1, mut rx1) = channel_handler();
        let (tx2, mut rx2) = channel_handler();
        bus.subscribe("news", tx1).await.unwrap();
        bus.subscribe("news", tx2).await.unwrap();

        assert_eq!(bus.publish("news", "x".to_string()).await.unwrap(), 2);
        assert_eq!(rx1.recv().await.unwrap().payload, "x");
        assert_eq!(rx2.recv().await.unwrap().payload, "x");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = LocalBus::default();
        let (tx, mut rx) = channel_handler();
        bus.subscribe("a", tx).await.unwrap();

        bus.publish("b", "not for a".to_string()).await.unwrap();
        bus.publish("a", "for a".to_string()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, "for a");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_is_idempotent() {
        let bus = LocalBus::default();
        let (tx, mut rx) = channel_handler();
        let id = bus.subscribe("news", tx).await.unwrap();

        bus.unsubscribe(id).await;
        bus.unsubscribe(id).await;

        assert_eq!(bus.publish("news", "late".to_string()).await.unwrap(), 0);
        // The handler (and its sender) was dropped with the task.
        assert!(rx.recv().await.is_none());

        let stats = bus.stats();
        assert_eq!(stats.subscribed_total, 1);
        assert_eq!(stats.unsubscribed_total, 1);
        assert_eq!(stats.active_subscriptions, 0);
        assert_eq!(stats.topics, 0, "empty topic should be pruned");
    }

    #[tokio::test]
    async fn unsubscribe_waits_for_in_flight_delivery() {
        let bus = LocalBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = bus
            .subscribe(
                "slow",
                SlowCounter {
                    calls: Arc::clone(&calls),
                    delay: Duration::from_millis(50),
                },
            )
            .await
            .unwrap();

        bus.publish("slow", "one".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.unsubscribe(id).await;

        let after_unsubscribe = calls.load(Ordering::SeqCst);
        bus.publish("slow", "two".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_unsubscribe);
    }

    #[tokio::test]
    async fn shutdown_rejects_further_calls() {
        let bus = LocalBus::default();
        let (tx, _rx) = channel_handler();
        bus.subscribe("news", tx).await.unwrap();

        bus.shutdown().await;

        assert!(bus.is_closed());
        assert_eq!(bus.stats().active_subscriptions, 0);
        assert!(matches!(
            bus.publish("news", "x".to_string()).await,
            Err(BusError::Closed)
        ));
        let (tx, _rx) = channel_handler();
        assert!(matches!(bus.subscribe("news", tx).await, Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn lagged_subscriber_keeps_receiving() {
        let bus = LocalBus::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "burst",
            SlowCounter {
                calls: Arc::clone(&calls),
                delay: Duration::from_millis(5),
            },
        )
        .await
        .unwrap();

        for i in 0..10 {
            bus.publish("burst", format!("m{i}")).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = calls.load(Ordering::SeqCst);
        assert!(seen >= 1 && seen < 10, "expected some deliveries dropped, saw {seen}");

        bus.publish("burst", "after".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen + 1);
    }

    #[test]
    fn debug_impl() {
        let bus = LocalBus::default();
        let debug = format!("{bus:?}");
        assert!(debug.contains("LocalBus"));
        assert!(debug.contains("subscriptions"));
    }
}
