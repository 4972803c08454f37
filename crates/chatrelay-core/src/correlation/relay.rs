//! One-shot request/reply over the bus.
//!
//! `CorrelationRelay::send` publishes a request to the inbound topic with a
//! fresh correlation id and waits for the reply carrying that id on the user's
//! reply topic. The reply subscription exists only for the duration of the call
//! and is removed exactly once on every exit path.

use std::sync::Arc;
use std::time::Duration;

use chatrelay_types::error::RelayError;
use chatrelay_types::wire::{BusEnvelope, ReplyEnvelope};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::waiter::CorrelationWaiter;
use crate::bus::topic::{self, reply_topic};
use crate::bus::{Delivery, DeliveryHandler, PubSub, SubscriptionId};

/// What to send through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub user_id: String,
    pub agent_id: String,
    pub text: String,
}

/// Subscription handler that resolves one waiter and ignores every other id.
struct CorrelationFilter {
    waiter: Arc<CorrelationWaiter>,
}

impl DeliveryHandler for CorrelationFilter {
    async fn handle(&self, delivery: Delivery) {
        let reply: ReplyEnvelope = match serde_json::from_str(&delivery.payload) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(topic = %delivery.topic, error = %e, "ignoring unparseable reply");
                return;
            }
        };
        if reply.correlation_id == self.waiter.id() {
            self.waiter.resolve(reply);
        }
    }
}

/// Owns the reply subscription of one in-flight send.
///
/// `release` unsubscribes inline. If the send future is dropped first, `Drop`
/// hands the unsubscribe to the runtime instead.
struct ReplySubscription<B: PubSub + 'static> {
    bus: Arc<B>,
    id: Option<SubscriptionId>,
}

impl<B: PubSub + 'static> ReplySubscription<B> {
    async fn release(mut self) {
        if let Some(id) = self.id.take() {
            self.bus.unsubscribe(id).await;
        }
    }
}

impl<B: PubSub + 'static> Drop for ReplySubscription<B> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let bus = Arc::clone(&self.bus);
                debug!(subscription = %id, "send abandoned, releasing reply subscription");
                handle.spawn(async move { bus.unsubscribe(id).await });
            }
            Err(_) => warn!(subscription = %id, "no runtime to release reply subscription"),
        }
    }
}

/// Request/reply matcher built on a [`PubSub`] bus.
pub struct CorrelationRelay<B: PubSub> {
    bus: Arc<B>,
    inbound_topic: String,
    timeout: Duration,
}

impl<B: PubSub + 'static> CorrelationRelay<B> {
    pub fn new(bus: Arc<B>, inbound_topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus,
            inbound_topic: inbound_topic.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and wait for its reply or the deadline.
    pub async fn send(&self, request: RelayRequest) -> Result<ReplyEnvelope, RelayError> {
        self.send_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send), but also gives up when `cancel` fires.
    ///
    /// Cancellation ends only this wait; it never touches the caller's scope.
    pub async fn send_with_cancel(
        &self,
        request: RelayRequest,
        cancel: &CancellationToken,
    ) -> Result<ReplyEnvelope, RelayError> {
        let envelope = topic::envelope(request.user_id, request.agent_id, request.text);
        let payload =
            serde_json::to_string(&envelope).map_err(|e| RelayError::Encode(e.to_string()))?;

        let (waiter, rx) = CorrelationWaiter::new(envelope.correlation_id.clone(), self.timeout);
        let waiter = Arc::new(waiter);

        // Subscribe before publishing so a fast reply cannot be missed.
        let replies = reply_topic(&envelope.user_id);
        let id = self
            .bus
            .subscribe(
                &replies,
                CorrelationFilter {
                    waiter: Arc::clone(&waiter),
                },
            )
            .await?;
        let subscription = ReplySubscription {
            bus: Arc::clone(&self.bus),
            id: Some(id),
        };

        let outcome = self
            .publish_and_wait(&envelope, payload, &waiter, rx, cancel)
            .await;

        subscription.release().await;
        outcome
    }

    async fn publish_and_wait(
        &self,
        envelope: &BusEnvelope,
        payload: String,
        waiter: &CorrelationWaiter,
        mut rx: oneshot::Receiver<ReplyEnvelope>,
        cancel: &CancellationToken,
    ) -> Result<ReplyEnvelope, RelayError> {
        let receivers = self.bus.publish(&self.inbound_topic, payload).await?;
        if receivers == 0 {
            warn!(
                correlation_id = %envelope.correlation_id,
                topic = %self.inbound_topic,
                "request published with no listeners"
            );
        }

        tokio::select! {
            biased;
            reply = &mut rx => reply.map_err(|_| RelayError::Timeout(self.timeout)),
            _ = tokio::time::sleep_until(waiter.deadline()) => {
                if waiter.expire() {
                    debug!(correlation_id = %envelope.correlation_id, "relay timed out");
                    Err(RelayError::Timeout(self.timeout))
                } else {
                    // Resolved in the same instant the deadline fired.
                    rx.await.map_err(|_| RelayError::Timeout(self.timeout))
                }
            }
            _ = cancel.cancelled() => {
                if waiter.expire() {
                    Err(RelayError::Cancelled)
                } else {
                    rx.await.map_err(|_| RelayError::Cancelled)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
