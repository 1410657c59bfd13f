//! Turn-engine gateway binary: HTTP/SSE front end over `turnengine-core`.
//!
//! Grounded on the teacher's `main.rs` (`init_tracing`, `load_config`,
//! `run_server`'s config-validation-then-abort loop), trimmed from its
//! ~20-subsystem CLI down to the two subcommands this gateway needs.

mod api;
mod bootstrap;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use turnengine_domain::config::{Config, ConfigSeverity};

#[derive(Parser)]
#[command(name = "turnengine", version)]
struct Cli {
    /// Path to config.toml. Missing sections fall back to defaults.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/SSE server (default).
    Serve,
    /// Print the resolved configuration as TOML and exit.
    ConfigShow,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli.config)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing();
            run_server(config).await
        }
        Command::ConfigShow => {
            println!("{}", toml::to_string_pretty(&*config)?);
            Ok(())
        }
    }
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,turnengine_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("turnengine gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let bind_addr = config.server.bind_addr.clone();
    let state = bootstrap::build_app_state(config)?;
    bootstrap::spawn_background_tasks(state.clone());

    let shutdown_streams = state.streams.clone();
    let app = api::router().with_state(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_streams))
        .await?;

    Ok(())
}

/// Waits for ctrl_c or SIGTERM, then cancels every live stream (spec.md §5
/// "If the registry is shutdown, each live stream is cancelled") before
/// `axum::serve` stops accepting connections.
async fn shutdown_signal(streams: Arc<turnengine_stream::StreamRegistry>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, cancelling live turn streams");
    streams.shutdown();
}
