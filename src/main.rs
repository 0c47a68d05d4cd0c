//! PulseWatch - HTTP endpoint health dashboard.

use std::time::Duration;

use pulsewatch::config::ServerConfig;
use pulsewatch::{Endpoint, PulseWatch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pulsewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting PulseWatch on port {}...", cfg.http_port);

    let mut targets = cfg.targets.clone();
    if targets.is_empty() {
        tracing::info!("No targets configured, adding sample target: example.com");
        targets.push(("Example".to_string(), "https://example.com".to_string()));
    }

    let mut endpoints = Vec::with_capacity(targets.len());
    for (name, url) in targets {
        endpoints.push(Endpoint::builder(name, url).build()?);
    }

    let pulsewatch = PulseWatch::builder()
        .title("PulseWatch")
        .endpoints(endpoints)
        .polling_interval(Duration::from_secs(cfg.interval_secs.max(1)))
        .port(cfg.http_port)
        .build()?;

    pulsewatch
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
