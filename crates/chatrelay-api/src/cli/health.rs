//! Connectivity and configuration check.
//!
//! Runs the same checks as server startup without binding a port: token key
//! present and usable, database opens and answers, bus accepts traffic.

use std::path::Path;

use anyhow::{Result, bail};
use console::style;

use chatrelay_core::health::{VerifyConnectionDyn, verify_all};
use chatrelay_infra::config::{LoadedConfig, TOKEN_KEY_ENV};
use chatrelay_infra::crypto::JwtTokenCodec;

use crate::state::AppState;

/// Check everything `serve` needs. Exits non-zero when anything fails.
pub async fn health(data_dir: &Path, loaded: LoadedConfig, json: bool) -> Result<()> {
    let key_status = match &loaded.token_key {
        None => Err(format!("not configured (set {TOKEN_KEY_ENV})")),
        Some(key) => JwtTokenCodec::new(key)
            .map(|codec| codec.key_fingerprint().to_string())
            .map_err(|e| e.to_string()),
    };

    let relay = loaded.relay.clone();
    let connectivity = match key_status {
        Ok(_) => match AppState::init(data_dir.to_path_buf(), loaded).await {
            Ok(state) => {
                let checks: [&dyn VerifyConnectionDyn; 2] = [&state.db_pool, state.bus.as_ref()];
                let result = verify_all(&checks).await.map_err(|e| e.to_string());
                state.db_pool.close().await;
                result
            }
            Err(e) => Err(format!("{e:#}")),
        },
        Err(_) => Err("skipped".to_string()),
    };

    let healthy = key_status.is_ok() && connectivity.is_ok();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "data_dir": data_dir.display().to_string(),
                "token_key": status_value(&key_status),
                "connectivity": status_value(&connectivity),
                "relay_timeout_secs": relay.relay_timeout_secs,
                "token_expiration_hours": relay.token_expiration_hours,
                "healthy": healthy,
            }))?
        );
    } else {
        let mark = |ok: bool| {
            if ok {
                format!("{}", style("✓").green())
            } else {
                format!("{}", style("✗").red())
            }
        };

        println!();
        println!(
            "  {} chatrelay v{}",
            style("⚡").bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!("  {}", style(data_dir.display()).dim());
        println!();
        match &key_status {
            Ok(fingerprint) => println!("  {} Token key (fingerprint {fingerprint})", mark(true)),
            Err(reason) => println!("  {} Token key: {reason}", mark(false)),
        }
        match &connectivity {
            Ok(()) => println!("  {} Database and bus reachable", mark(true)),
            Err(reason) => println!("  {} Connectivity: {reason}", mark(false)),
        }
        println!(
            "  {} Relay timeout {}s, tokens valid {}h",
            style("i").blue(),
            relay.relay_timeout_secs,
            relay.token_expiration_hours
        );
        println!();
    }

    if !healthy {
        bail!("health check failed");
    }
    Ok(())
}

fn status_value<T>(status: &std::result::Result<T, String>) -> serde_json::Value {
    match status {
        Ok(_) => serde_json::json!({ "ok": true }),
        Err(reason) => serde_json::json!({ "ok": false, "reason": reason }),
    }
}
