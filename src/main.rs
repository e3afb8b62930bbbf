use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use silicon_auth::config::Config;
use silicon_auth::health::HealthChecker;
use silicon_auth::metrics::MetricsCollector;
use silicon_auth::server::HealthServer;
use silicon_auth::Bridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let metrics = Arc::new(MetricsCollector::new());
    let bridge = Bridge::bind(&config, metrics.clone()).await?;
    info!(pool = %bridge.pool_addr()?, api = %bridge.api_addr()?, "silicon-bridge starting");

    if config.metrics_enabled {
        let checker = Arc::new(HealthChecker::new(metrics.clone(), bridge.state(), config.clone()));
        let server = HealthServer::new(checker, config.health_port);
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!(error = %e, "health server stopped");
            }
        });
    }

    tokio::select! {
        res = bridge.run() => res.context("bridge stopped")?,
        _ = tokio::signal::ctrl_c() => warn!("interrupted, shutting down"),
    }
    Ok(())
}
