//! chatrelay CLI and server entry point.
//!
//! Binary name: `chatrelay`
//!
//! Parses CLI arguments, initializes tracing, configuration, database and
//! services, then dispatches to the command handler or starts the server.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use clap::Parser;
use clap_complete::generate;

use chatrelay_core::bus::PubSub;
use chatrelay_core::health::{VerifyConnectionDyn, verify_all};
use chatrelay_core::responder::{EchoGenerator, Responder};
use chatrelay_infra::config::load_config;
use chatrelay_infra::data_dir::{ensure_data_dir, resolve_data_dir};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "chatrelay", &mut std::io::stdout());
        return Ok(());
    }

    chatrelay_observe::tracing_setup::init_tracing(cli.otel_enabled(), cli.log_directive())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    chatrelay_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir();
    ensure_data_dir(&data_dir).await?;
    let loaded = load_config(&data_dir).await;
    tracing::debug!(data_dir = %data_dir.display(), config = ?loaded, "configuration loaded");

    if let Commands::Health = cli.command {
        return cli::health::health(&data_dir, loaded, cli.json).await;
    }

    let state = AppState::init(data_dir, loaded).await?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            echo,
            otel: _,
        } => serve(state, &host, port, echo).await?,

        Commands::Token { command } => {
            cli::token::handle_token_command(command, &state, cli.json).await?;
        }

        Commands::Grant { agent_id, user_ids } => {
            cli::grant::grant(&state, &agent_id, &user_ids, cli.json).await?;
        }

        Commands::Chat { command } => {
            cli::chat::handle_chat_command(command, &state, cli.json).await?;
        }

        Commands::Health | Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Verify connectivity, start background tasks, and serve until a shutdown signal.
async fn serve(state: AppState, host: &str, port: u16, echo: bool) -> anyhow::Result<()> {
    let checks: [&dyn VerifyConnectionDyn; 2] = [&state.db_pool, state.bus.as_ref()];
    verify_all(&checks).await?;

    let purge = state.spawn_session_purge();

    let responder = if echo {
        let responder = Responder::new(
            Arc::clone(&state.bus),
            Arc::new(EchoGenerator),
            state.config.inbound_topic.clone(),
        );
        Some(responder.start(state.shutdown.child_token()).await?)
    } else {
        None
    };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, echo, "server listening");

    println!(
        "  {} chatrelay listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {} {}",
        console::style("WebSocket:").dim(),
        console::style(format!("ws://{addr}/ws/chat?token=<token>")).cyan()
    );
    if echo {
        println!("  {}", console::style("Echo responder enabled").yellow());
    }
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state.clone());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    // Stop background work, then the bus and the database.
    state.shutdown.cancel();
    if let Err(e) = purge.await {
        tracing::warn!(error = %e, "session purge task failed");
    }
    if let Some(responder) = responder {
        if let Err(e) = responder.await {
            tracing::warn!(error = %e, "responder task failed");
        }
    }
    state.bus.shutdown().await;
    state.db_pool.close().await;

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel the server's shutdown token so
/// open WebSocket connections close and graceful shutdown can finish.
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
