//! Chat aggregate and message types.
//!
//! A [`Chat`] belongs to one user and holds an append-only, ordered list of
//! [`ChatMessage`]s. Its status only ever toggles between `OPEN` and `CLOSED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid message sender: '{other}'")),
        }
    }
}

/// Lifecycle status of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatStatus {
    Open,
    Closed,
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStatus::Open => write!(f, "OPEN"),
            ChatStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(ChatStatus::Open),
            "CLOSED" => Ok(ChatStatus::Closed),
            other => Err(format!("invalid chat status: '{other}'")),
        }
    }
}

impl Default for ChatStatus {
    fn default() -> Self {
        ChatStatus::Open
    }
}

/// A single message within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation owned by one user.
///
/// Messages are ordered by insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub owner_id: String,
    pub messages: Vec<ChatMessage>,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_serializes_lowercase() {
        let json = serde_json::to_string(&Sender::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        assert_eq!("USER".parse::<Sender>().unwrap(), Sender::User);
        assert!("agent".parse::<Sender>().is_err());
    }

    #[test]
    fn test_chat_status_roundtrip() {
        for status in [ChatStatus::Open, ChatStatus::Closed] {
            let parsed: ChatStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
        let json = serde_json::to_string(&ChatStatus::Closed).unwrap();
        assert_eq!(json, "\"CLOSED\"");
    }

    #[test]
    fn test_chat_status_default() {
        assert_eq!(ChatStatus::default(), ChatStatus::Open);
    }

    #[test]
    fn test_message_constructors_set_sender() {
        assert_eq!(ChatMessage::user("hi").sender, Sender::User);
        assert_eq!(ChatMessage::assistant("hello").sender, Sender::Assistant);
    }
}
