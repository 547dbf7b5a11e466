//! Axum server setup and router configuration.

use crate::api::{ingest, ws};
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(hub_stats))
        .route("/ws", get(ws::hub_ws))
        .nest("/internal", ingest::router())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /stats`: live connection, user and channel counts.
async fn hub_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.stats())
}

/// Run the server until SIGTERM/SIGINT.
///
/// On the signal, `shutdown_tx` is flipped first so the hub closes every
/// session; upgraded connections would otherwise keep the graceful
/// shutdown waiting.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    serve(listener, router, async move {
        shutdown_signal().await;
        shutdown_tx.send_replace(true);
    })
    .await
}

/// Serve `router` on an already bound listener until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
