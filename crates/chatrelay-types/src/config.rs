//! Relay configuration types.
//!
//! `RelayConfig` holds the non-secret settings read from `config.toml`. The
//! token signing key is loaded separately by the infrastructure layer so it
//! never travels through this plain struct.

use serde::{Deserialize, Serialize};

/// Top-level relay settings. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Validity window of issued tokens, also the session record TTL.
    #[serde(default = "default_token_expiration_hours")]
    pub token_expiration_hours: u64,

    /// Deadline for a correlated reply.
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,

    /// Shared topic the gateway publishes inbound messages to.
    #[serde(default = "default_inbound_topic")]
    pub inbound_topic: String,

    /// Capacity of each connection's outbound writer queue.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Per-topic buffer of the in-process bus.
    #[serde(default = "default_bus_buffer")]
    pub bus_buffer: usize,

    /// How often expired session records are purged.
    #[serde(default = "default_session_purge_interval_secs")]
    pub session_purge_interval_secs: u64,
}

fn default_token_expiration_hours() -> u64 {
    2
}

fn default_relay_timeout_secs() -> u64 {
    15
}

fn default_inbound_topic() -> String {
    "chat_messages".to_string()
}

fn default_outbound_queue_capacity() -> usize {
    64
}

fn default_bus_buffer() -> usize {
    1024
}

fn default_session_purge_interval_secs() -> u64 {
    300
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            token_expiration_hours: default_token_expiration_hours(),
            relay_timeout_secs: default_relay_timeout_secs(),
            inbound_topic: default_inbound_topic(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            bus_buffer: default_bus_buffer(),
            session_purge_interval_secs: default_session_purge_interval_secs(),
        }
    }
}

impl RelayConfig {
    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.token_expiration_hours * 3600)
    }

    pub fn relay_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.relay_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default_values() {
        let config = RelayConfig::default();
        assert_eq!(config.token_expiration_hours, 2);
        assert_eq!(config.relay_timeout_secs, 15);
        assert_eq!(config.inbound_topic, "chat_messages");
        assert_eq!(config.session_ttl().as_secs(), 7200);
    }

    #[test]
    fn test_relay_config_deserialize_with_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.token_expiration_hours, 2);
        assert_eq!(config.outbound_queue_capacity, 64);
    }

    #[test]
    fn test_relay_config_deserialize_with_values() {
        let toml_str = r#"
token_expiration_hours = 8
relay_timeout_secs = 30
inbound_topic = "inbox"
"#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.token_expiration_hours, 8);
        assert_eq!(config.relay_timeout().as_secs(), 30);
        assert_eq!(config.inbound_topic, "inbox");
        assert_eq!(config.bus_buffer, 1024);
    }
}
