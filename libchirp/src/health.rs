//! Liveness endpoint for deployment platforms
//!
//! Serves a static payload on `GET /` and `GET /health`. It shares no state
//! with the main loop: if the process is up, it answers.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const SERVICE_NAME: &str = "chirp";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
}

pub const STATUS: HealthStatus = HealthStatus {
    status: "ok",
    service: SERVICE_NAME,
};

async fn health() -> Json<HealthStatus> {
    Json(STATUS)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}

/// Serve on an already bound listener until the process exits
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Health endpoint listening at http://{}", addr);
    }
    axum::serve(listener, router()).await
}

/// Bind `addr` and serve in a background task.
///
/// Binding happens before this returns so a taken port is reported at startup.
pub async fn spawn(addr: SocketAddr) -> std::io::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    Ok(tokio::spawn(async move {
        if let Err(e) = serve(listener).await {
            error!("Health endpoint stopped: {}", e);
        }
    }))
}
