//! CLI command definitions for the `chatrelay` binary.
//!
//! Uses clap derive macros for argument parsing. Resource commands follow a
//! noun-verb pattern (e.g., `chatrelay token issue`, `chatrelay chat show`).

pub mod chat;
pub mod grant;
pub mod health;
pub mod token;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use chat::ChatCommand;
use token::TokenCommand;

/// Real-time chat relay: WebSocket gateway, session tokens, and reply correlation.
#[derive(Parser)]
#[command(name = "chatrelay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebSocket gateway and REST API server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Answer every inbound message with "<text>-reply" (local development).
        #[arg(long)]
        echo: bool,

        /// Also export spans to stdout through OpenTelemetry.
        #[arg(long)]
        otel: bool,
    },

    /// Issue, revoke, or check session tokens.
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },

    /// Allow users to talk to an agent.
    Grant {
        /// Agent to grant access to.
        #[arg(long)]
        agent_id: String,

        /// Users receiving access.
        #[arg(required = true)]
        user_ids: Vec<String>,
    },

    /// Create and inspect chats.
    Chat {
        #[command(subcommand)]
        command: ChatCommand,
    },

    /// Check configuration, database, and bus connectivity.
    Health,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Default tracing directive for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,chatrelay=debug",
            _ => "trace",
        }
    }

    pub fn otel_enabled(&self) -> bool {
        matches!(self.command, Commands::Serve { otel: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["chatrelay", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { port, host, echo, otel } => {
                assert_eq!(port, 3000);
                assert_eq!(host, "127.0.0.1");
                assert!(!echo);
                assert!(!otel);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_grant() {
        let cli =
            Cli::try_parse_from(["chatrelay", "grant", "--agent-id", "3", "7", "8"]).unwrap();
        match cli.command {
            Commands::Grant { agent_id, user_ids } => {
                assert_eq!(agent_id, "3");
                assert_eq!(user_ids, vec!["7", "8"]);
            }
            _ => panic!("expected grant"),
        }

        assert!(Cli::try_parse_from(["chatrelay", "grant", "--agent-id", "3"]).is_err());
    }

    #[test]
    fn test_log_directive() {
        let cli = Cli::try_parse_from(["chatrelay", "--quiet", "health"]).unwrap();
        assert_eq!(cli.log_directive(), "error");

        let cli = Cli::try_parse_from(["chatrelay", "-vv", "health"]).unwrap();
        assert_eq!(cli.log_directive(), "trace");

        let cli = Cli::try_parse_from(["chatrelay", "serve", "--otel"]).unwrap();
        assert!(cli.otel_enabled());
        assert_eq!(cli.log_directive(), "warn");
    }
}
