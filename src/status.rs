//! Status model shared by the poller, store, and web layers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health classification of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The endpoint is healthy and responding normally.
    Up,
    /// The endpoint is unreachable or returning errors.
    Down,
    /// The endpoint is partially functional or slow.
    Degraded,
    /// The status could not be determined (e.g. an extractor could not
    /// parse the response).
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Up => "up",
            Status::Down => "down",
            Status::Degraded => "degraded",
            Status::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Determines the [`Status`] of an endpoint from its HTTP response.
///
/// Extractors are treated as untrusted user code: the scheduler invokes
/// them inside a panic-recovery boundary. If an extractor panics, the
/// endpoint is marked [`Status::Down`] with an error carrying only a
/// correlation identifier; the full panic detail is logged server-side.
pub type StatusExtractor = Arc<dyn Fn(&[u8], u16) -> Status + Send + Sync>;

/// Outcome of polling a single endpoint.
///
/// Immutable after creation. Every hop across a concurrency boundary
/// (scheduler → store → subscribers) sends its own clone, so no receiver
/// can mutate what another receiver sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    /// Display name of the polled endpoint.
    pub name: String,

    /// Target URL that was polled.
    pub url: String,

    /// Determined health status.
    pub status: Status,

    /// Key-value metadata associated with the endpoint.
    pub labels: HashMap<String, String>,

    /// Time taken to complete the HTTP request.
    #[serde(rename = "response_time_ms", with = "duration_millis")]
    pub latency: Duration,

    /// When the poll was performed.
    pub checked_at: DateTime<Utc>,

    /// Error message if the poll failed. `None` means the request
    /// completed, though the status may still be down or degraded.
    pub error: Option<String>,

    /// HTTP response body, limited to 1 MiB. Not exposed on the wire.
    #[serde(skip)]
    pub raw_response: Vec<u8>,

    /// HTTP status code, 0 if no response was received. Not exposed on
    /// the wire.
    #[serde(skip)]
    pub status_code: u16,
}

/// Serializes a [`Duration`] as whole milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(serde_json::to_string(&Status::Up).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&Status::Degraded).unwrap(), "\"degraded\"");
        assert_eq!(Status::Down.to_string(), "down");
    }

    #[test]
    fn test_result_serialization() {
        let result = StatusResult {
            name: "api".to_string(),
            url: "https://example.com/health".to_string(),
            status: Status::Up,
            labels: HashMap::new(),
            latency: Duration::from_millis(42),
            checked_at: Utc::now(),
            error: None,
            raw_response: b"ok".to_vec(),
            status_code: 200,
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(json["status"], "up");
        assert_eq!(json["response_time_ms"], 42);
        assert!(json["error"].is_null());
        // body and status code stay server-side
        assert!(json.get("raw_response").is_none());
        assert!(json.get("status_code").is_none());
    }
}
