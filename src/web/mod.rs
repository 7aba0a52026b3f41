//! HTTP surface: live streaming, range queries and downloads of container
//! logs.

pub mod download;
pub mod error;
pub mod query;
pub mod range;
pub mod stream;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use log::{error, info};

use crate::logs::generator::DEFAULT_CAPACITY;
use crate::runtime::ContainerRuntime;

/// Default cadence of keep-alive comments on live streams.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub ping_interval: Duration,
    /// Capacity of each generator's event channel.
    pub event_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            event_buffer: DEFAULT_CAPACITY,
        }
    }
}

/// State shared across axum handlers. Nothing in here is mutated by a
/// request.
pub struct AppState {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub settings: StreamSettings,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/containers/{id}/logs", get(range::fetch_logs_between_dates))
        .route("/containers/{id}/logs/stream", get(stream::stream_logs))
        .route("/containers/{id}/logs/download", get(download::download_logs))
        .with_state(state)
}

/// Serve until the process is asked to stop. Open connections, including
/// live streams, are dropped at that point.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving container logs on {}", addr);

    tokio::select! {
        res = axum::serve(listener, router(state)).into_future() => res,
        _ = shutdown_signal() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Result<&'static str, (StatusCode, String)> {
    state
        .runtime
        .ping()
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok("ok")
}
