//! Client frames and bus envelopes.
//!
//! Clients speak JSON text frames over the duplex connection:
//! - inbound [`InboundFrame`]: `{chatId?, userId, agentId, text, dev?}`
//! - outbound [`ServerFrame`]: a relayed reply
//!   `{conversation_id, chat_id, user_id, agent_id, message}` or an in-band error.
//!
//! On the bus, the gateway publishes a [`BusEnvelope`] to the shared inbound
//! topic and consumes [`ReplyEnvelope`]s from the per-user reply topic.

use serde::{Deserialize, Deserializer, Serialize};

/// A message frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub agent_id: String,
    pub text: String,
    /// Request mode: the reply must arrive within the relay timeout or the
    /// client receives a `timeout` error frame.
    #[serde(default)]
    pub dev: bool,
}

/// Envelope published to the shared inbound topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEnvelope {
    pub correlation_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub text: String,
}

/// Reply published on a user's reply topic.
///
/// Older responders used `conversation_id`/`message`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    #[serde(alias = "conversation_id")]
    pub correlation_id: String,
    #[serde(alias = "message")]
    pub text: String,
}

/// A relayed reply in the client wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub conversation_id: String,
    pub chat_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub message: String,
}

/// Machine-readable code of an in-band error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Permission check denied or frame user does not match the token subject.
    Forbidden,
    /// A request-mode frame got no reply before its deadline.
    Timeout,
    /// The frame could not be relayed (bus failure).
    Unavailable,
}

/// An in-band error sent to the client. The connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Any frame the server writes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Reply(OutboundFrame),
    Error(ErrorFrame),
}

impl ServerFrame {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorFrame {
            error: code,
            message: message.into(),
            conversation_id: None,
        })
    }

    pub fn correlated_error(
        code: ErrorCode,
        message: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        ServerFrame::Error(ErrorFrame {
            error: code,
            message: message.into(),
            conversation_id: Some(conversation_id.into()),
        })
    }
}

/// Accept ids sent either as JSON strings or as integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => Ok(s),
        Raw::Int(n) => Ok(n.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_frame_minimal() {
        let frame: InboundFrame =
            serde_json::from_value(json!({"userId": "7", "agentId": "3", "text": "hi"})).unwrap();
        assert_eq!(frame.user_id, "7");
        assert_eq!(frame.agent_id, "3");
        assert!(frame.chat_id.is_none());
        assert!(!frame.dev);
    }

    #[test]
    fn test_inbound_frame_numeric_ids() {
        let frame: InboundFrame = serde_json::from_value(
            json!({"chatId": "c1", "userId": 7, "agentId": 3, "text": "hi", "dev": true}),
        )
        .unwrap();
        assert_eq!(frame.user_id, "7");
        assert_eq!(frame.agent_id, "3");
        assert_eq!(frame.chat_id.as_deref(), Some("c1"));
        assert!(frame.dev);
    }

    #[test]
    fn test_inbound_frame_missing_text_rejected() {
        let result: Result<InboundFrame, _> =
            serde_json::from_value(json!({"userId": "7", "agentId": "3"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_bus_envelope_uses_camel_case() {
        let env = BusEnvelope {
            correlation_id: "abc".to_string(),
            user_id: "7".to_string(),
            agent_id: "3".to_string(),
            text: "hi".to_string(),
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["correlationId"], "abc");
        assert_eq!(value["userId"], "7");
    }

    #[test]
    fn test_reply_envelope_accepts_legacy_names() {
        let reply: ReplyEnvelope =
            serde_json::from_value(json!({"conversation_id": "abc", "message": "yo"})).unwrap();
        assert_eq!(reply.correlation_id, "abc");
        assert_eq!(reply.text, "yo");
    }

    #[test]
    fn test_server_frame_shapes() {
        let reply = ServerFrame::Reply(OutboundFrame {
            conversation_id: "abc".to_string(),
            chat_id: "c1".to_string(),
            user_id: "7".to_string(),
            agent_id: "3".to_string(),
            message: "hi-reply".to_string(),
        });
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["message"], "hi-reply");
        assert!(value.get("error").is_none());

        let err = ServerFrame::error(ErrorCode::Forbidden, "no access");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "forbidden");
        assert!(value.get("conversation_id").is_none());
    }
}
