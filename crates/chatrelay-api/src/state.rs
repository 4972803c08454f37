//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and the
//! HTTP/WebSocket server. Core services are generic over their ports; AppState
//! pins them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use chatrelay_core::bus::LocalBus;
use chatrelay_core::correlation::CorrelationRelay;
use chatrelay_core::gateway::{Connection, ConnectionConfig, OutboundQueue};
use chatrelay_core::session::SessionAuthority;
use chatrelay_infra::config::{LoadedConfig, TOKEN_KEY_ENV};
use chatrelay_infra::crypto::JwtTokenCodec;
use chatrelay_infra::sqlite::chat::SqliteChatStore;
use chatrelay_infra::sqlite::permission::SqlitePermissionRepository;
use chatrelay_infra::sqlite::pool::{DatabasePool, database_url};
use chatrelay_infra::sqlite::session::SqliteSessionStore;
use chatrelay_types::config::RelayConfig;
use chatrelay_types::identity::Identity;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteAuthority = SessionAuthority<JwtTokenCodec, SqliteSessionStore>;

pub type ConcreteConnection = Connection<LocalBus, SqlitePermissionRepository, SqliteChatStore>;

/// Shared application state.
///
/// Cloned into every request handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub bus: Arc<LocalBus>,
    pub authority: Arc<ConcreteAuthority>,
    pub permissions: Arc<SqlitePermissionRepository>,
    pub chats: Arc<SqliteChatStore>,
    pub relay: Arc<CorrelationRelay<LocalBus>>,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize the application state: open the DB, build the bus, wire services.
    ///
    /// Fails if no token signing key is configured.
    pub async fn init(data_dir: PathBuf, loaded: LoadedConfig) -> anyhow::Result<Self> {
        let LoadedConfig { relay, token_key } = loaded;

        let token_key = token_key.with_context(|| {
            format!(
                "no token signing key configured; set {TOKEN_KEY_ENV} or token_private_key in {}",
                data_dir.join("config.toml").display()
            )
        })?;
        let codec = JwtTokenCodec::new(&token_key)?;
        tracing::debug!(key = codec.key_fingerprint(), "token codec ready");

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open database")?;

        let bus = Arc::new(LocalBus::new(relay.bus_buffer));

        let authority = SessionAuthority::new(
            codec,
            SqliteSessionStore::new(db_pool.clone()),
            relay.session_ttl(),
        );

        let correlation = CorrelationRelay::new(
            Arc::clone(&bus),
            relay.inbound_topic.clone(),
            relay.relay_timeout(),
        );

        Ok(Self {
            permissions: Arc::new(SqlitePermissionRepository::new(db_pool.clone())),
            chats: Arc::new(SqliteChatStore::new(db_pool.clone())),
            authority: Arc::new(authority),
            relay: Arc::new(correlation),
            config: Arc::new(relay),
            data_dir,
            db_pool,
            bus,
            shutdown: CancellationToken::new(),
        })
    }

    /// Per-connection settings for the gateway.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::from(self.config.as_ref())
    }

    /// Start a gateway connection for an authenticated identity.
    pub fn open_connection(&self, identity: Identity) -> (ConcreteConnection, OutboundQueue) {
        Connection::new(
            identity,
            Arc::clone(&self.bus),
            Arc::clone(&self.permissions),
            Arc::clone(&self.chats),
            self.connection_config(),
        )
    }

    /// Periodically drop expired session records until shutdown.
    pub fn spawn_session_purge(&self) -> JoinHandle<()> {
        let authority = Arc::clone(&self.authority);
        let cancel = self.shutdown.child_token();
        let period = Duration::from_secs(self.config.session_purge_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match authority.purge_expired().await {
                            Ok(0) => {}
                            Ok(purged) => tracing::info!(purged, "expired sessions purged"),
                            Err(e) => tracing::warn!(error = %e, "session purge failed"),
                        }
                    }
                }
            }

            tracing::debug!("session purge task stopped");
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::SecretString;

    pub(crate) const TEST_KEY: &str = "test-signing-key-0123456789abcdef0123";

    pub(crate) async fn test_state(relay: RelayConfig) -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedConfig {
            relay,
            token_key: Some(SecretString::from(TEST_KEY.to_string())),
        };
        let state = AppState::init(dir.path().to_path_buf(), loaded).await.unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn test_init_requires_token_key() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedConfig {
            relay: RelayConfig::default(),
            token_key: None,
        };
        let err = AppState::init(dir.path().to_path_buf(), loaded)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains(TOKEN_KEY_ENV));
    }

    #[tokio::test]
    async fn test_init_rejects_short_key() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedConfig {
            relay: RelayConfig::default(),
            token_key: Some(SecretString::from("short".to_string())),
        };
        assert!(AppState::init(dir.path().to_path_buf(), loaded).await.is_err());
    }

    #[tokio::test]
    async fn test_init_creates_database() {
        let (dir, state) = test_state(RelayConfig::default()).await;
        assert!(dir.path().join("chatrelay.db").exists());
        assert_eq!(state.connection_config().inbound_topic, "chat_messages");
        assert_eq!(state.relay.timeout(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_session_purge_stops_on_shutdown() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        let handle = state.spawn_session_purge();
        state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
