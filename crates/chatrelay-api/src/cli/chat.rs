//! Chat CLI commands: create, show, list.

use anyhow::{Result, bail};
use clap::Subcommand;
use console::style;

use chatrelay_core::chat::ChatStore;
use chatrelay_types::chat::{ChatStatus, Sender};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ChatCommand {
    /// Create an empty chat for a user.
    Create {
        #[arg(long)]
        user_id: String,
    },

    /// Show a chat and its messages.
    Show {
        chat_id: String,
    },

    /// List a user's chats, most recent first.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        user_id: String,
    },
}

/// Handle a chat subcommand.
pub async fn handle_chat_command(cmd: ChatCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ChatCommand::Create { user_id } => create(state, &user_id, json).await,
        ChatCommand::Show { chat_id } => show(state, &chat_id, json).await,
        ChatCommand::List { user_id } => list(state, &user_id, json).await,
    }
}

async fn create(state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let chat = state.chats.create_chat(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
    } else {
        println!(
            "  {} Chat {} created for user {}",
            style("✓").green().bold(),
            style(&chat.id).cyan(),
            user_id
        );
    }
    Ok(())
}

async fn show(state: &AppState, chat_id: &str, json: bool) -> Result<()> {
    let Some(chat) = state.chats.get_chat(chat_id).await? else {
        bail!("chat '{chat_id}' not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
        return Ok(());
    }

    let status = match chat.status {
        ChatStatus::Open => style(chat.status.to_string()).green(),
        ChatStatus::Closed => style(chat.status.to_string()).dim(),
    };

    println!();
    println!(
        "  {} (owner {}) {}",
        style(&chat.id).cyan().bold(),
        chat.owner_id,
        status
    );
    println!();
    for message in &chat.messages {
        let who = match message.sender {
            Sender::User => style("user").bold(),
            Sender::Assistant => style("assistant").magenta().bold(),
        };
        println!(
            "  {} {}: {}",
            style(message.timestamp.format("%H:%M:%S")).dim(),
            who,
            message.text
        );
    }
    if chat.messages.is_empty() {
        println!("  {}", style("(no messages)").dim());
    }
    println!();
    Ok(())
}

async fn list(state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let chats = state.chats.list_user_chats(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
        return Ok(());
    }

    if chats.is_empty() {
        println!("  {} No chats for user {}", style("i").blue().bold(), user_id);
        return Ok(());
    }

    for chat in &chats {
        println!(
            "  {}  {}  {}",
            style(&chat.id).cyan(),
            chat.status,
            style(chat.updated_at.format("%Y-%m-%d %H:%M")).dim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use chatrelay_types::chat::ChatMessage;
    use chatrelay_types::config::RelayConfig;

    #[tokio::test]
    async fn test_show_missing_chat_fails() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        let err = show(&state, "missing", false).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_create_then_show() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        create(&state, "7", true).await.unwrap();

        let chats = state.chats.list_user_chats("7").await.unwrap();
        assert_eq!(chats.len(), 1);
        state
            .chats
            .append_message(&chats[0].id, &ChatMessage::user("hi"))
            .await
            .unwrap();

        show(&state, &chats[0].id, false).await.unwrap();
        list(&state, "7", false).await.unwrap();
    }
}
