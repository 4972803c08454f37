//! Relay configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.chatrelay/` in production)
//! and deserializes it into [`RelayConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed. The token signing key is read from
//! the same file (`token_private_key`) or the `CHATRELAY_TOKEN_KEY` environment
//! variable and kept wrapped in a [`SecretString`].

use std::path::Path;

use chatrelay_types::config::RelayConfig;
use secrecy::SecretString;
use serde::Deserialize;

/// Environment variable overriding `token_private_key`.
pub const TOKEN_KEY_ENV: &str = "CHATRELAY_TOKEN_KEY";

/// Everything loaded from configuration.
pub struct LoadedConfig {
    pub relay: RelayConfig,
    pub token_key: Option<SecretString>,
}

impl std::fmt::Debug for LoadedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedConfig")
            .field("relay", &self.relay)
            .field("token_key", &self.token_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// On-disk shape: the relay settings plus the secret.
#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    token_private_key: Option<String>,
    #[serde(flatten)]
    relay: RelayConfig,
}

/// Load configuration from `{data_dir}/config.toml` and the environment.
///
/// - If the file does not exist, relay settings are the defaults.
/// - If the file exists but fails to parse, logs a warning and uses the defaults.
/// - `CHATRELAY_TOKEN_KEY`, when set and non-empty, overrides the file's key.
pub async fn load_config(data_dir: &Path) -> LoadedConfig {
    let file = read_config_file(data_dir).await;
    let env_key = std::env::var(TOKEN_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .map(SecretString::from);

    LoadedConfig {
        relay: file.relay,
        token_key: env_key.or(file.token_private_key.map(SecretString::from)),
    }
}

async fn read_config_file(data_dir: &Path) -> ConfigFile {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ConfigFile::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ConfigFile::default();
        }
    };

    match toml::from_str::<ConfigFile>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ConfigFile::default()
        }
    }
}
