//! Data directory layout.
//!
//! Everything chatrelay persists lives under one directory: `config.toml` and
//! the `chatrelay.db` SQLite database.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHATRELAY_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CHATRELAY_DATA_DIR` environment variable
/// 2. `~/.chatrelay`
/// 3. `./.chatrelay`
pub fn resolve_data_dir() -> PathBuf {
    resolve_from(std::env::var(DATA_DIR_ENV).ok(), dirs::home_dir())
}

fn resolve_from(env_value: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_value.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(home) = home {
        return home.join(".chatrelay");
    }

    // Last resort: current directory
    PathBuf::from(".chatrelay")
}

/// Create the data directory if needed.
pub async fn ensure_data_dir(data_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_dir).await
}
