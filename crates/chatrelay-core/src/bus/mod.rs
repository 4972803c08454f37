//! Publish/subscribe bus adapter.
//!
//! This module provides the transient fan-out primitive the relay is built on:
//! - `PubSub` -- the port: fire-and-forget publish, handler-based subscribe,
//!   idempotent unsubscribe, explicit shutdown
//! - `local` -- `LocalBus`, the process-scoped in-memory implementation
//! - `topic` -- topic names and envelope constructors
//!
//! Delivery is at-most-once. A message published while nobody is subscribed
//! to its topic is lost.

pub mod local;
pub mod topic;

use std::future::Future;

use chatrelay_types::error::BusError;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use local::{BusStats, LocalBus};

/// A single message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: String,
}

/// Opaque handle returned by [`PubSub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives deliveries for one subscription.
///
/// The handler value is the subscription's context: whatever state it needs is
/// owned by the handler and handed over at subscribe time. Handlers run on the
/// bus's delivery task, so they should finish quickly. A handler must never
/// unsubscribe its own subscription (unsubscribe waits for the handler).
pub trait DeliveryHandler: Send + Sync + 'static {
    fn handle(&self, delivery: Delivery) -> impl Future<Output = ()> + Send;
}

/// Forwarding handler: pushes every delivery into an unbounded channel.
impl DeliveryHandler for mpsc::UnboundedSender<Delivery> {
    async fn handle(&self, delivery: Delivery) {
        let _ = self.send(delivery);
    }
}

/// Port for a publish/subscribe bus.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition). One instance is
/// created at startup and shared by every component that needs it.
pub trait PubSub: Send + Sync {
    /// Publish a payload to a topic. Returns how many subscribers received it;
    /// zero means the message was lost.
    fn publish(
        &self,
        topic: &str,
        payload: String,
    ) -> impl Future<Output = Result<usize, BusError>> + Send;

    /// Attach a handler to a topic. The subscription is live when this returns.
    fn subscribe<H: DeliveryHandler>(
        &self,
        topic: &str,
        handler: H,
    ) -> impl Future<Output = Result<SubscriptionId, BusError>> + Send;

    /// Detach a subscription. Idempotent. Once this returns the handler is
    /// never invoked again.
    fn unsubscribe(&self, id: SubscriptionId) -> impl Future<Output = ()> + Send;

    /// Close the bus: drop every subscription and reject further calls.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}
