use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use videotube::{
    api::{self, AppState, HttpSettings},
    config::{DEFAULT_CONFIG_PATH, load_server_config_from},
    media::LocalMediaStorage,
    security::ensure_not_root,
    store::Database,
    tokens::TokenService,
};

const DEFAULT_LOG_FILTER: &str = "videotube=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the VideoTube REST API.")]
struct Args {
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the env-style config file")]
    config: PathBuf,
    #[arg(long = "host", value_name = "ADDR", help = "Override VIDEOTUBE_HOST")]
    host: Option<std::net::IpAddr>,
    #[arg(long = "port", value_name = "PORT", help = "Override VIDEOTUBE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    ensure_not_root("videotube backend")?;
    let args = Args::parse();

    let mut config = load_server_config_from(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let db = Database::open(&config.database_path).context("opening database")?;
    let media = LocalMediaStorage::new(config.media_root.clone(), config.public_media_url.clone())
        .with_context(|| format!("preparing media root {}", config.media_root.display()))?;

    let state = AppState {
        db,
        tokens: Arc::new(TokenService::new(&config.tokens)),
        media: Arc::new(media),
        cookie_secure: config.cookie_secure,
    };
    let app = api::router(state, &HttpSettings::from(&config))?;

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, database = %config.database_path.display(), "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(%err, "failed to install Ctrl+C handler");
    }
}
