//! cvewire server
//!
//! Real-time notification hub: pushes security articles, alert matches and
//! announcements to connected clients over WebSocket.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use cvewire_core::alerts::{AlertMatcher, PgAlertStore};
use cvewire_core::events::article_ingested_channel;
use cvewire_core::hub::Hub;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// cvewire - real-time security notification hub
#[derive(Parser, Debug)]
#[command(name = "cvewire-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./cvewire-config.toml", env = "CVEWIRE_CONFIG")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting cvewire-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let shared_config = loaded_config.into_shared();

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Exactly one hub per process.
    let (hub, hub_handle) = Hub::new(shared_config.hub.clone());
    let hub_task = tokio::spawn(hub.run(shutdown_rx.clone()));

    let (article_tx, article_rx) = article_ingested_channel();
    let matcher_concurrency = shared_config.matcher.concurrency;
    let state = AppState::new(shared_config, hub_handle, article_tx);

    let matcher = Arc::new(AlertMatcher::new(
        Arc::new(PgAlertStore::new(db_pool.clone())),
        state.notifier.clone(),
    ));
    let matcher_task = tokio::spawn(matcher.run(shutdown_rx, article_rx, matcher_concurrency));

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_tx.clone()).await;

    // Covers the error path, where no signal flipped it.
    shutdown_tx.send_replace(true);
    reload_notify.notify_one();

    for (name, task) in [("hub", hub_task), ("alert matcher", matcher_task)] {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "{} task failed", name);
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
