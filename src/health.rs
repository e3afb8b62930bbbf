use std::sync::Arc;
use crate::bridge::{BridgeState, BridgeStatus};
use crate::metrics::{MetricsCollector, HealthStatus};
use crate::config::Config;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

pub struct HealthChecker {
    metrics: Arc<MetricsCollector>,
    bridge: Arc<BridgeState>,
    config: Config,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(metrics: Arc<MetricsCollector>, bridge: Arc<BridgeState>, config: Config) -> Self {
        Self {
            metrics,
            bridge,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_health(&self) -> HealthResponse {
        let health_status = self.metrics.get_health_status();
        let uptime_seconds = self.start_time.elapsed().as_secs();

        HealthResponse {
            status: health_status.to_string(),
            uptime_seconds,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn prometheus_text(&self) -> Result<String, std::fmt::Error> {
        self.metrics.export_prometheus()
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.metrics.get_health_status(), HealthStatus::Healthy)
    }

    pub fn get_detailed_status(&self) -> DetailedStatus {
        let metrics = self.metrics.get_metrics();
        let health_status = self.metrics.get_health_status();

        DetailedStatus {
            health: health_status.to_string(),
            uptime_seconds: metrics.uptime_seconds,
            bridge: self.bridge.status(),
            requests_received: metrics.requests_received,
            jobs_dispatched: metrics.jobs_dispatched,
            jobs_completed: metrics.jobs_completed,
            jobs_rejected: metrics.jobs_rejected,
            jobs_expired: metrics.jobs_expired,
            stale_submits: metrics.stale_submits,
            average_latency_ms: metrics.average_latency_ms,
            proofs_per_second: metrics.proofs_per_second,
            device_connections: metrics.device_connections,
            error_counts: ErrorCounts {
                connectivity_errors: metrics.connectivity_errors,
                protocol_errors: metrics.protocol_errors,
                request_errors: metrics.request_errors,
            },
            config_summary: ConfigSummary {
                stratum_addr: self.config.stratum_addr.to_string(),
                api_addr: self.config.api_addr.to_string(),
                device_difficulty: self.config.device_difficulty,
                nbits: self.config.nbits.clone(),
                job_timeout_ms: self.config.job_timeout_ms,
                max_concurrent_requests: self.config.max_concurrent_requests,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailedStatus {
    pub health: String,
    pub uptime_seconds: u64,
    pub bridge: BridgeStatus,
    pub requests_received: u64,
    pub jobs_dispatched: u64,
    pub jobs_completed: u64,
    pub jobs_rejected: u64,
    pub jobs_expired: u64,
    pub stale_submits: u64,
    pub average_latency_ms: f64,
    pub proofs_per_second: f64,
    pub device_connections: u64,
    pub error_counts: ErrorCounts,
    pub config_summary: ConfigSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub connectivity_errors: u64,
    pub protocol_errors: u64,
    pub request_errors: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub stratum_addr: String,
    pub api_addr: String,
    pub device_difficulty: f64,
    pub nbits: String,
    pub job_timeout_ms: u64,
    pub max_concurrent_requests: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionPhase;

    #[test]
    fn status_reflects_bridge_state() {
        let metrics = Arc::new(MetricsCollector::new());
        let bridge = Arc::new(BridgeState::new(Config::default(), metrics.clone()));
        let checker = HealthChecker::new(metrics, bridge, Config::default());

        let status = checker.get_detailed_status();
        assert_eq!(status.bridge.phase, SessionPhase::Disconnected);
        assert_eq!(status.health, "unhealthy");
        assert!(!checker.is_healthy());
        assert_eq!(status.config_summary.api_addr, "0.0.0.0:4000");

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["bridge"]["phase"], "disconnected");
    }
}
