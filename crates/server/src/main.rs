//! Lorry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use lorry_core::config::AppConfig;
use lorry_server::bootstrap::ensure_admin_user;
use lorry_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lorry - a package host with a content-addressed file store
#[derive(Parser, Debug)]
#[command(name = "lorryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LORRY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Merge the optional config file with `LORRY_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    figment
        .merge(Env::prefixed("LORRY_").split("__").ignore(&["config"]))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lorry v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    lorry_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let blobs = lorry_storage::from_config(&config.storage)
        .await
        .context("failed to initialize content store")?;
    blobs
        .health_check()
        .await
        .context("content store health check failed")?;
    tracing::info!(path = %config.storage.path.display(), "Content store initialized");

    let metadata = lorry_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!(path = %config.metadata.path.display(), "Metadata store initialized");

    match &config.admin {
        Some(admin) => ensure_admin_user(metadata.as_ref(), admin).await?,
        None => tracing::warn!("No admin configured, no moderator account will be bootstrapped"),
    }

    let state = AppState::new(config.clone(), blobs, metadata).await?;
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
