//! HTTP probe client for health polling.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use reqwest::Method;
use thiserror::Error;

/// Response bodies are read up to this many bytes; the rest is discarded.
/// Truncation is not an error.
const MAX_RESPONSE_BODY_SIZE: usize = 1 << 20; // 1 MiB

// connection pooling limits to prevent socket growth when polling many hosts
const MAX_IDLE_CONNS_PER_HOST: usize = 10;
const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(60);

/// Probe transport error.
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("failed to build request: {0}")]
    Request(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("probe client is closed")]
    Closed,
}

/// Result of one HTTP probe.
///
/// A probe never fails past its boundary: errors are captured in the
/// `error` field rather than returned separately, which simplifies
/// handling in the scheduler. A non-`None` error means the endpoint is
/// unreachable and short-circuits status derivation to down.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Response body, capped at 1 MiB.
    pub body: Vec<u8>,

    /// HTTP status code, 0 if no response was received.
    pub status_code: u16,

    /// Total time taken for the request.
    pub latency: Duration,

    /// Transport error, if any.
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    fn failed(latency: Duration, error: ProbeError) -> Self {
        Self {
            body: Vec::new(),
            status_code: 0,
            latency,
            error: Some(error),
        }
    }
}

/// HTTP client wrapper optimized for polling health endpoints.
///
/// Timeouts are attached per request rather than client-wide, so
/// concurrently in-flight probes with different timeouts do not interfere.
/// The connection pool is bounded (10 idle connections per host, 60s idle
/// timeout) and shared by all scheduler workers.
pub struct ProbeClient {
    inner: RwLock<Option<reqwest::Client>>,
}

impl ProbeClient {
    /// Creates a probe client with bounded connection pooling.
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .pool_idle_timeout(IDLE_CONN_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        Ok(Self {
            inner: RwLock::new(Some(client)),
        })
    }

    /// Performs one HTTP request and returns a structured [`ProbeOutcome`].
    ///
    /// The body read is streamed and capped at 1 MiB; a larger body is
    /// silently truncated. Never panics and never returns `Err` - all
    /// failures land in the outcome's `error` field.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> ProbeOutcome {
        let start = Instant::now();

        // clone out of the lock so no probe holds it across an await
        let client = match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(client) = client else {
            return ProbeOutcome::failed(start.elapsed(), ProbeError::Closed);
        };

        let mut request = client.request(method, url).timeout(timeout);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let mut response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let error = if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else if e.is_builder() {
                    ProbeError::Request(e.to_string())
                } else {
                    ProbeError::Transport(e.to_string())
                };
                return ProbeOutcome::failed(start.elapsed(), error);
            }
        };

        let status_code = response.status().as_u16();

        let mut body: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let remaining = MAX_RESPONSE_BODY_SIZE - body.len();
                    let take = remaining.min(chunk.len());
                    body.extend_from_slice(&chunk[..take]);
                    if take < chunk.len() {
                        break; // cap reached, drop the rest
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let error = if e.is_timeout() {
                        ProbeError::Timeout(timeout)
                    } else {
                        ProbeError::Body(e.to_string())
                    };
                    return ProbeOutcome {
                        body,
                        status_code,
                        latency: start.elapsed(),
                        error: Some(error),
                    };
                }
            }
        }

        ProbeOutcome {
            body,
            status_code,
            latency: start.elapsed(),
            error: None,
        }
    }

    /// Releases pooled connections by dropping the inner client.
    ///
    /// Idempotent. After close, [`ProbeClient::fetch`] reports a
    /// [`ProbeError::Closed`] outcome.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        let client = ProbeClient::new().unwrap();
        let outcome = client
            .fetch(
                Method::GET,
                "http://127.0.0.1:1",
                &HashMap::new(),
                Duration::from_millis(500),
            )
            .await;
        assert!(outcome.error.is_some());
        assert_eq!(outcome.status_code, 0);
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let client = ProbeClient::new().unwrap();
        let outcome = client
            .fetch(
                Method::GET,
                "not a url",
                &HashMap::new(),
                Duration::from_millis(500),
            )
            .await;
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = ProbeClient::new().unwrap();
        client.close();
        client.close();

        let outcome = client
            .fetch(
                Method::GET,
                "http://127.0.0.1:1",
                &HashMap::new(),
                Duration::from_millis(100),
            )
            .await;
        assert!(matches!(outcome.error, Some(ProbeError::Closed)));
    }
}
