//! makaroni -- paste sharing server.
//!
//! SIGTERM/SIGINT stop accepting connections and give in-flight
//! requests `server.shutdown_timeout` seconds to finish.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use makaroni::config::{Config, LoggingConfig};
use makaroni::highlight::{Highlighter, SyntectHighlighter};
use makaroni::storage::backend::ObjectStore;
use makaroni::storage::memory::MemoryStore;
use makaroni::storage::s3::S3Store;

/// Command-line arguments for the makaroni server.
#[derive(Parser, Debug)]
#[command(name = "makaroni", version, about = "Paste sharing server")]
struct Cli {
    /// Path to the YAML configuration file. Defaults plus `MKRN_*`
    /// environment variables are used when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => makaroni::config::load_config(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No configuration file given, using defaults and environment"),
    }

    config.check()?;
    config.log_settings();

    let bind_addr = cli
        .bind
        .clone()
        .unwrap_or_else(|| config.server.bind_address());

    let highlighter = SyntectHighlighter::new();
    if !highlighter.has_style(&config.site.style) {
        anyhow::bail!("unknown highlighting style '{}'", config.site.style);
    }
    let highlighter: Arc<dyn Highlighter> = Arc::new(highlighter);

    let store: Arc<dyn ObjectStore> = match config.storage.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory object store; pastes are lost on restart");
            Arc::new(MemoryStore::new())
        }
        _ => Arc::new(S3Store::new(&config.storage.s3).await?),
    };

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(makaroni::AppState::new(config, store, highlighter)?);
    let app = makaroni::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("makaroni listening on {}", bind_addr);

    let stopping = Arc::new(tokio::sync::Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let stopping = stopping.clone();
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    });

    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("In-flight requests still running after {:?}, exiting", shutdown_timeout);
        }
    }

    info!("makaroni shut down");

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
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
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
