//! Web server: dashboard, status API, and the SSE stream.

mod handlers;

pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::store::StatusStore;
use crate::Error;

/// How long the server waits for open connections after shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StatusStore>,
    pub title: String,
    /// Fires on server shutdown so every SSE loop exits promptly.
    pub shutdown: broadcast::Sender<()>,
}

/// HTTP server for the status dashboard.
///
/// Routes:
///   - `GET /`: dashboard page
///   - `GET /api/status`: all current statuses as JSON
///   - `GET /api/sse`: Server-Sent Events stream of updates
pub struct Server {
    state: AppState,
    port: u16,
}

impl Server {
    pub fn new(
        store: Arc<StatusStore>,
        port: u16,
        title: String,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            state: AppState {
                store,
                title,
                shutdown,
            },
            port,
        }
    }

    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/", get(handlers::handle_dashboard))
            .route("/api/status", get(handlers::handle_status))
            .route("/api/sse", get(handlers::handle_sse))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Binds the listener and begins serving in a background task.
    ///
    /// Binding happens before returning, so a port conflict surfaces here
    /// as a startup error instead of being swallowed. Returns the bound
    /// address and a handle that resolves when the server has fully shut
    /// down (triggered by the shutdown signal, bounded by a grace period).
    pub async fn start(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| Error::Bind {
            port: self.port,
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| Error::Bind {
            port: self.port,
            source: e,
        })?;

        let router = self.routes();
        let mut shutdown_rx = self.state.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "http server error");
            }
        });

        tracing::info!(addr = %local_addr, "web server listening");
        Ok((local_addr, handle))
    }

    /// Grace period callers should allow after signaling shutdown.
    pub fn shutdown_grace() -> Duration {
        SHUTDOWN_GRACE
    }
}
