//! Agent permission CLI command.

use anyhow::Result;
use console::style;

use chatrelay_core::permission::PermissionCheck;

use crate::state::AppState;

/// Grant `user_ids` access to `agent_id`. Already-granted users are skipped.
pub async fn grant(state: &AppState, agent_id: &str, user_ids: &[String], json: bool) -> Result<()> {
    let added = state.permissions.grant(agent_id, user_ids).await?;
    let users = state.permissions.users_with_permission(agent_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "agent_id": agent_id,
                "added": added,
                "users": users,
            })
        );
        return Ok(());
    }

    println!(
        "  {} Agent {} now allows {} user{} ({} new)",
        style("✓").green().bold(),
        style(agent_id).cyan(),
        users.len(),
        if users.len() == 1 { "" } else { "s" },
        added
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use chatrelay_types::config::RelayConfig;

    #[tokio::test]
    async fn test_grant_persists() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        grant(&state, "3", &["7".to_string(), "8".to_string()], true)
            .await
            .unwrap();

        assert!(state.permissions.has_permission("7", "3").await.unwrap());
        assert!(state.permissions.has_permission("8", "3").await.unwrap());
        assert!(!state.permissions.has_permission("9", "3").await.unwrap());
    }
}
