mod access;
mod config;
mod health;
mod http;
mod listing;
mod manifest;
mod metrics;
mod relay;
mod store;
mod tier;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::manifest::ManifestResolver;
use crate::metrics::MetricsRegistry;
use crate::store::ContentStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "modgate", about = "Tier-gated access proxy for a mod repository")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/modgate/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Repository holding the mods and their manifests.
    pub store: Arc<dyn ContentStore>,
    pub resolver: ManifestResolver,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn ContentStore>, metrics: MetricsRegistry) -> Self {
        let resolver = ManifestResolver::new(
            Arc::clone(&store),
            &config.upstream.manifest_file,
            Duration::from_secs(config.upstream.timeout_secs),
        );
        Self {
            config,
            store,
            resolver,
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let app = http::handler::create_router(Arc::new(state.clone()));

    let listen_addr: std::net::SocketAddr = state
        .config
        .proxy
        .http_listen
        .parse()
        .context("invalid http_listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        config_path = %cli.config,
        repository = %config.upstream.repository,
        branch = %config.upstream.branch,
        "starting modgate"
    );

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- Content store ----
    let store: Arc<dyn ContentStore> = Arc::from(store::build_store(&config, metrics.clone())?);
    tracing::info!(api_url = %config.upstream.api_url, "content store initialised");

    // ---- App state ----
    let state = AppState::new(Arc::clone(&config), store, metrics);

    run_http_server(state).await?;

    tracing::info!("modgate shut down cleanly");
    Ok(())
}
