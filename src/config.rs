//! Configuration for the pulsewatch binary.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the dashboard (default: 8080)
    pub http_port: u16,
    /// Global polling interval in seconds (default: 15)
    pub interval_secs: u64,
    /// Monitored targets as `name=url` pairs.
    pub targets: Vec<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            interval_secs: 15,
            targets: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PULSEWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PULSEWATCH_INTERVAL_SECS`: polling interval in seconds (default: 15)
    /// - `PULSEWATCH_TARGETS`: comma-separated `name=url` pairs
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("PULSEWATCH_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(interval_str) = env::var("PULSEWATCH_INTERVAL_SECS") {
            if let Ok(interval) = interval_str.parse() {
                cfg.interval_secs = interval;
            }
        }

        if let Ok(targets) = env::var("PULSEWATCH_TARGETS") {
            cfg.targets = parse_targets(&targets);
        }

        cfg
    }
}

/// Parses `name=url[,name=url...]`, skipping malformed entries.
fn parse_targets(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, url) = pair.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some((name.to_string(), url.to_string()))
        })
        .collect()
}
