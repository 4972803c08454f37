//! Reply worker.
//!
//! A `Responder` consumes the shared inbound topic, asks a [`ReplyGenerator`]
//! for the text of each reply, and publishes it to the requesting user's reply
//! topic with the original correlation id. Generators that talk to a real model
//! live outside this crate; [`EchoGenerator`] is the built-in stand-in.

use std::future::Future;
use std::sync::Arc;

use chatrelay_types::error::BusError;
use chatrelay_types::wire::BusEnvelope;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::topic::{reply_to, reply_topic};
use crate::bus::{Delivery, PubSub, SubscriptionId};

/// Failure to produce a reply for one request.
#[derive(Debug, Error)]
#[error("reply generation failed: {0}")]
pub struct GenerateError(pub String);

/// Produces the reply text for an inbound request.
pub trait ReplyGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        request: &BusEnvelope,
    ) -> impl Future<Output = Result<String, GenerateError>> + Send;
}

/// Answers every request with `"{text}-reply"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

impl ReplyGenerator for EchoGenerator {
    async fn generate(&self, request: &BusEnvelope) -> Result<String, GenerateError> {
        Ok(format!("{}-reply", request.text))
    }
}

pub struct Responder<B: PubSub + 'static, G: ReplyGenerator> {
    bus: Arc<B>,
    generator: Arc<G>,
    inbound_topic: String,
}

impl<B: PubSub + 'static, G: ReplyGenerator> Responder<B, G> {
    pub fn new(bus: Arc<B>, generator: Arc<G>, inbound_topic: impl Into<String>) -> Self {
        Self {
            bus,
            generator,
            inbound_topic: inbound_topic.into(),
        }
    }

    /// Subscribe to the inbound topic and spawn the worker loop.
    ///
    /// The subscription is live when this returns. The loop exits (and
    /// unsubscribes) when `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> Result<JoinHandle<()>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.bus.subscribe(&self.inbound_topic, tx).await?;
        info!(topic = %self.inbound_topic, "responder started");
        Ok(tokio::spawn(self.run(subscription, rx, cancel)))
    }

    async fn run(
        self,
        subscription: SubscriptionId,
        mut rx: mpsc::UnboundedReceiver<Delivery>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                delivery = rx.recv() => match delivery {
                    Some(delivery) => self.respond(delivery).await,
                    None => break,
                }
            }
        }
        self.bus.unsubscribe(subscription).await;
        info!(topic = %self.inbound_topic, "responder stopped");
    }

    async fn respond(&self, delivery: Delivery) {
        let request: BusEnvelope = match serde_json::from_str(&delivery.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(topic = %delivery.topic, error = %e, "dropping malformed request");
                return;
            }
        };

        let text = match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(correlation_id = %request.correlation_id, error = %e, "no reply generated");
                return;
            }
        };

        let reply = reply_to(&request, text);
        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(correlation_id = %request.correlation_id, error = %e, "failed to encode reply");
                return;
            }
        };

        match self.bus.publish(&reply_topic(&request.user_id), payload).await {
            Ok(receivers) => debug!(
                correlation_id = %request.correlation_id,
                user_id = %request.user_id,
                receivers,
                "reply published"
            ),
            Err(e) => warn!(correlation_id = %request.correlation_id, error = %e, "failed to publish reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::bus::topic::{INBOUND_TOPIC, envelope};
    use chatrelay_types::wire::ReplyEnvelope;
    use std::time::Duration;

    struct FailingGenerator;

    impl ReplyGenerator for FailingGenerator {
        async fn generate(&self, _request: &BusEnvelope) -> Result<String, GenerateError> {
            Err(GenerateError("model offline".to_string()))
        }
    }

    async fn listen(bus: &LocalBus, user: &str) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(&reply_topic(user), tx).await.unwrap();
        rx
    }

    #[tokio::test]
    async fn echo_reply_goes_to_the_user_topic() {
        let bus = Arc::new(LocalBus::default());
        let cancel = CancellationToken::new();
        Responder::new(Arc::clone(&bus), Arc::new(EchoGenerator), INBOUND_TOPIC)
            .start(cancel.clone())
            .await
            .unwrap();
        let mut replies = listen(&bus, "7").await;

        let request = envelope("7", "3", "hi");
        bus.publish(INBOUND_TOPIC, serde_json::to_string(&request).unwrap())
            .await
            .unwrap();

        let delivery = replies.recv().await.unwrap();
        let reply: ReplyEnvelope = serde_json::from_str(&delivery.payload).unwrap();
        assert_eq!(reply.correlation_id, request.correlation_id);
        assert_eq!(reply.text, "hi-reply");
        cancel.cancel();
    }

    #[tokio::test]
    async fn malformed_and_failed_requests_are_dropped() {
        let bus = Arc::new(LocalBus::default());
        let cancel = CancellationToken::new();
        Responder::new(Arc::clone(&bus), Arc::new(FailingGenerator), INBOUND_TOPIC)
            .start(cancel.clone())
            .await
            .unwrap();
        let mut replies = listen(&bus, "7").await;

        bus.publish(INBOUND_TOPIC, "not json".to_string())
            .await
            .unwrap();
        let request = envelope("7", "3", "hi");
        bus.publish(INBOUND_TOPIC, serde_json::to_string(&request).unwrap())
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(50), replies.recv()).await;
        assert!(outcome.is_err(), "no reply expected");
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancel_stops_and_unsubscribes() {
        let bus = Arc::new(LocalBus::default());
        let cancel = CancellationToken::new();
        let handle = Responder::new(Arc::clone(&bus), Arc::new(EchoGenerator), INBOUND_TOPIC)
            .start(cancel.clone())
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count(INBOUND_TOPIC), 1);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(bus.subscriber_count(INBOUND_TOPIC), 0);
    }
}
