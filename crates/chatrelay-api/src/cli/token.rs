//! Session token CLI commands: issue, revoke, check.
//!
//! Login against a user table is not part of chatrelay; operators issue tokens
//! here and hand them to clients.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use chatrelay_core::session::token_hint;
use chatrelay_types::identity::{User, UserRole};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Issue a signed token and record its session.
    Issue {
        #[arg(long)]
        user_id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// user, curator, or admin.
        #[arg(long, default_value = "user")]
        role: UserRole,
    },

    /// Revoke a token immediately (logout).
    Revoke {
        token: String,
    },

    /// Validate a token and print who it belongs to.
    Check {
        token: String,
    },
}

/// Handle a token subcommand.
pub async fn handle_token_command(cmd: TokenCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        TokenCommand::Issue {
            user_id,
            name,
            email,
            role,
        } => {
            let user = User {
                id: user_id,
                name,
                email,
                role,
            };
            issue(state, &user, json).await
        }
        TokenCommand::Revoke { token } => revoke(state, &token, json).await,
        TokenCommand::Check { token } => check(state, &token, json).await,
    }
}

async fn issue(state: &AppState, user: &User, json: bool) -> Result<()> {
    let token = state.authority.issue_token(user).await?;
    let hours = state.authority.session_ttl().as_secs() / 3600;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "token": token,
                "user_id": user.id,
                "role": user.role,
                "expires_in_secs": state.authority.session_ttl().as_secs(),
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} Token issued for '{}' ({}), valid {}h:",
        style("✓").green().bold(),
        style(&user.name).cyan(),
        user.role,
        hours
    );
    println!();
    println!("  {}", style(&token).yellow().bold());
    println!();
    Ok(())
}

async fn revoke(state: &AppState, token: &str, json: bool) -> Result<()> {
    let revoked = state.authority.revoke_token(token).await?;

    if json {
        println!("{}", serde_json::json!({ "revoked": revoked }));
    } else if revoked {
        println!(
            "  {} Session {}... revoked",
            style("✓").green().bold(),
            token_hint(token)
        );
    } else {
        println!(
            "  {} No live session for {}...",
            style("i").blue().bold(),
            token_hint(token)
        );
    }
    Ok(())
}

async fn check(state: &AppState, token: &str, json: bool) -> Result<()> {
    match state.authority.validate_token(token).await {
        Ok(identity) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "valid": true, "identity": identity })
                );
            } else {
                println!(
                    "  {} Valid: {} <{}> ({}), expires {}",
                    style("✓").green().bold(),
                    style(&identity.name).cyan(),
                    identity.email,
                    identity.role,
                    identity.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(())
        }
        Err(e) if e.is_unauthenticated() => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "valid": false, "reason": e.to_string() })
                );
            } else {
                println!("  {} Invalid: {}", style("✗").red().bold(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use chatrelay_types::config::RelayConfig;

    fn command(args: &[&str]) -> TokenCommand {
        #[derive(clap::Parser)]
        struct Wrapper {
            #[command(subcommand)]
            cmd: TokenCommand,
        }
        let mut argv = vec!["token"];
        argv.extend_from_slice(args);
        <Wrapper as clap::Parser>::try_parse_from(argv).unwrap().cmd
    }

    #[test]
    fn test_parse_issue_role() {
        match command(&[
            "issue", "--user-id", "7", "--name", "Ana", "--email", "ana@example.com", "--role",
            "curator",
        ]) {
            TokenCommand::Issue { role, .. } => assert_eq!(role, UserRole::Curator),
            _ => panic!("expected issue"),
        }
    }

    #[tokio::test]
    async fn test_issue_check_revoke() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        let user = User {
            id: "7".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: UserRole::User,
        };
        issue(&state, &user, true).await.unwrap();

        let token = state.authority.issue_token(&user).await.unwrap();
        check(&state, &token, true).await.unwrap();
        revoke(&state, &token, true).await.unwrap();
        assert!(state.authority.validate_token(&token).await.is_err());

        // Checking an invalid token reports it rather than failing.
        check(&state, "garbage", false).await.unwrap();
    }
}
