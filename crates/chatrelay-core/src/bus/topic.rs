//! Topic names and envelope constructors.
//!
//! Inbound messages from every connection go to one shared topic; replies are
//! routed back on a per-user topic.

use chatrelay_types::wire::{BusEnvelope, ReplyEnvelope};
use uuid::Uuid;

/// Shared topic every gateway publishes inbound user messages to.
pub const INBOUND_TOPIC: &str = "chat_messages";

/// Per-user reply topic: `user:{user_id}:responses`.
pub fn reply_topic(user_id: &str) -> String {
    format!("user:{user_id}:responses")
}

/// Fresh correlation id. Time-ordered, so ids sort by creation in logs.
pub fn new_correlation_id() -> String {
    Uuid::now_v7().to_string()
}

/// Build an inbound envelope with a fresh correlation id.
pub fn envelope(
    user_id: impl Into<String>,
    agent_id: impl Into<String>,
    text: impl Into<String>,
) -> BusEnvelope {
    BusEnvelope {
        correlation_id: new_correlation_id(),
        user_id: user_id.into(),
        agent_id: agent_id.into(),
        text: text.into(),
    }
}

/// Build the reply to an inbound envelope, carrying its correlation id.
pub fn reply_to(original: &BusEnvelope, text: impl Into<String>) -> ReplyEnvelope {
    ReplyEnvelope {
        correlation_id: original.correlation_id.clone(),
        text: text.into(),
    }
}
