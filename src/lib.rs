//! PulseWatch - HTTP endpoint health polling with a live dashboard.
//!
//! PulseWatch periodically probes a set of HTTP endpoints, classifies each
//! response into a health status, and serves the latest status of every
//! endpoint over a JSON snapshot API and a Server-Sent Events stream.
//!
//! ```no_run
//! use pulsewatch::{Endpoint, PulseWatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pulsewatch::Error> {
//!     let api = Endpoint::builder("API", "https://api.example.com/health").build()?;
//!
//!     PulseWatch::builder()
//!         .endpoint(api)
//!         .port(8080)
//!         .build()?
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod config;
mod endpoint;
pub mod extractors;
mod grid;
pub mod probe;
pub mod scheduler;
mod status;
pub mod store;
pub mod web;

pub use endpoint::{Endpoint, EndpointBuilder};
pub use grid::EndpointGrid;
pub use scheduler::Scheduler;
pub use status::{Status, StatusExtractor, StatusResult};
pub use store::{StatusStore, Subscription};

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error as ThisError;
use tokio::sync::broadcast;

use crate::probe::ProbeError;
use crate::web::Server;

const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Crate-level error.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Callback invoked for every poll result, after the store update.
///
/// Callbacks are panic-isolated: a panicking callback is logged and does
/// not affect polling, the store, or other callbacks.
pub type StatusCallback = Arc<dyn Fn(StatusResult) + Send + Sync>;

/// Orchestrator wiring the scheduler, store, and web server together.
///
/// Build with [`PulseWatch::builder`], then call [`PulseWatch::run`],
/// which blocks until the supplied shutdown future resolves.
pub struct PulseWatch {
    title: String,
    endpoints: Vec<Endpoint>,
    polling_interval: Duration,
    port: u16,
    max_concurrency: usize,
    callbacks: Vec<StatusCallback>,
    store: Arc<StatusStore>,
}

impl PulseWatch {
    pub fn builder() -> PulseWatchBuilder {
        PulseWatchBuilder {
            title: String::new(),
            endpoints: Vec::new(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            port: DEFAULT_PORT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            callbacks: Vec::new(),
        }
    }

    /// The store holding the latest status per endpoint. Useful when
    /// embedding PulseWatch behind custom read surfaces.
    pub fn store(&self) -> Arc<StatusStore> {
        self.store.clone()
    }

    /// Configured dashboard port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Configured global polling interval.
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Polls endpoints and serves the dashboard until `shutdown` resolves.
    ///
    /// Returns an error if the HTTP server fails to bind; any in-band
    /// failure (unreachable endpoint, panicking extractor or callback,
    /// slow dashboard client) is contained and reported as data.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> Result<(), Error> {
        tracing::info!(
            endpoints = self.endpoints.len(),
            interval_secs = self.polling_interval.as_secs(),
            "pulsewatch starting"
        );

        let scheduler = Scheduler::new(
            self.endpoints.clone(),
            self.polling_interval,
            self.max_concurrency,
        )?;
        let mut results = scheduler
            .take_results()
            .ok_or_else(|| Error::InvalidConfig("scheduler results already consumed".to_string()))?;
        scheduler.start();

        // single consumer loop: store update first, then callbacks, so a
        // streaming observer can never see a callback effect ahead of the
        // corresponding store state
        let store = self.store.clone();
        let callbacks = self.callbacks.clone();
        let consumer = tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                store.update(result.clone());

                for callback in &callbacks {
                    invoke_callback_safe(callback, result.clone());
                }

                match &result.error {
                    Some(error) => tracing::warn!(
                        endpoint = %result.name,
                        status = %result.status,
                        error = %error,
                        "poll completed with error"
                    ),
                    None => tracing::debug!(
                        endpoint = %result.name,
                        status = %result.status,
                        latency_ms = result.latency.as_millis() as u64,
                        "poll completed"
                    ),
                }
            }
        });

        let (shutdown_tx, _) = broadcast::channel(1);
        let server = Server::new(
            self.store.clone(),
            self.port,
            self.title.clone(),
            shutdown_tx.clone(),
        );
        let (addr, server_handle) = match server.start().await {
            Ok(started) => started,
            Err(e) => {
                scheduler.stop().await;
                let _ = consumer.await;
                return Err(e);
            }
        };
        tracing::info!(addr = %addr, "dashboard available");

        shutdown.await;

        // ordered teardown: stop dispatching and wait for workers, drain
        // the consumer (store reflects every emitted result), then shut
        // the server down within its grace period
        scheduler.stop().await;
        let _ = consumer.await;
        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Server::shutdown_grace(), server_handle).await;

        tracing::info!("pulsewatch stopped");
        Ok(())
    }
}

/// Builder for [`PulseWatch`], validating on [`PulseWatchBuilder::build`].
pub struct PulseWatchBuilder {
    title: String,
    endpoints: Vec<Endpoint>,
    polling_interval: Duration,
    port: u16,
    max_concurrency: usize,
    callbacks: Vec<StatusCallback>,
}

impl PulseWatchBuilder {
    /// Sets the dashboard title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Adds one endpoint.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Adds several endpoints (for example a grid expansion).
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Sets the global default polling interval (default 15s).
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Sets the dashboard HTTP port (default 8080).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the maximum number of concurrent probes (default 10).
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Registers a status callback, invoked after each store update.
    pub fn on_status(mut self, callback: StatusCallback) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Validates the configuration and builds a [`PulseWatch`].
    pub fn build(self) -> Result<PulseWatch, Error> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig("at least one endpoint is required".to_string()));
        }

        // unique names are required for per-endpoint interval tracking
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.endpoints.len());
        for ep in &self.endpoints {
            if !seen.insert(ep.name()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate endpoint name: {:?}",
                    ep.name()
                )));
            }
        }

        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::InvalidConfig("max concurrency must be positive".to_string()));
        }
        if self.polling_interval.is_zero() {
            return Err(Error::InvalidConfig("polling interval must be positive".to_string()));
        }

        Ok(PulseWatch {
            title: self.title,
            endpoints: self.endpoints,
            polling_interval: self.polling_interval,
            port: self.port,
            max_concurrency: self.max_concurrency,
            callbacks: self.callbacks,
            store: Arc::new(StatusStore::new()),
        })
    }
}

/// Calls a status callback with panic recovery. Panics are logged but do
/// not propagate.
fn invoke_callback_safe(callback: &StatusCallback, result: StatusResult) {
    let endpoint = result.name.clone();
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
        let detail: &str = if let Some(s) = panic.downcast_ref::<&str>() {
            s
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s
        } else {
            "<non-string panic payload>"
        };
        tracing::error!(endpoint = %endpoint, panic = %detail, "status callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::builder(name, format!("https://example.com/{name}"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let pw = PulseWatch::builder().endpoint(endpoint("a")).build().unwrap();
        assert_eq!(pw.port(), 8080);
        assert_eq!(pw.polling_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_builder_requires_endpoints() {
        assert!(PulseWatch::builder().build().is_err());
    }

    #[test]
    fn test_builder_rejects_duplicate_names() {
        let err = PulseWatch::builder()
            .endpoint(endpoint("a"))
            .endpoint(endpoint("a"))
            .build();
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_settings() {
        assert!(PulseWatch::builder().endpoint(endpoint("a")).port(0).build().is_err());
        assert!(PulseWatch::builder()
            .endpoint(endpoint("a"))
            .max_concurrency(0)
            .build()
            .is_err());
        assert!(PulseWatch::builder()
            .endpoint(endpoint("a"))
            .polling_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_callback_panic_is_contained() {
        let callback: StatusCallback = Arc::new(|_| panic!("callback boom"));
        let result = StatusResult {
            name: "api".to_string(),
            url: "https://example.com".to_string(),
            status: Status::Up,
            labels: Default::default(),
            latency: Duration::from_millis(1),
            checked_at: chrono::Utc::now(),
            error: None,
            raw_response: Vec::new(),
            status_code: 200,
        };
        // must not unwind
        invoke_callback_safe(&callback, result);
    }
}
