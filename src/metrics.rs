use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use serde::{Deserialize, Serialize};

use crate::prometheus_metrics::PrometheusMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    // Job lifecycle
    pub requests_received: u64,
    pub jobs_dispatched: u64,
    pub jobs_completed: u64,
    pub jobs_rejected: u64,
    pub jobs_expired: u64,
    pub stale_submits: u64,
    pub pending_jobs: u64,

    // Proof latency
    pub average_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,

    // Error metrics
    pub connectivity_errors: u64,
    pub protocol_errors: u64,
    pub request_errors: u64,

    // Device
    pub device_connected: bool,
    pub device_connections: u64,
    pub consecutive_rejections: u32,

    // Health metrics
    pub uptime_seconds: u64,
    pub last_completed_job: Option<u64>,
    pub proofs_per_second: f64,
}

pub struct MetricsCollector {
    requests_received: AtomicU64,
    jobs_dispatched: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_rejected: AtomicU64,
    jobs_expired: AtomicU64,
    stale_submits: AtomicU64,
    pending_jobs: AtomicU64,

    connectivity_errors: AtomicU64,
    protocol_errors: AtomicU64,
    request_errors: AtomicU64,

    device_connected: AtomicBool,
    device_connections: AtomicU64,
    consecutive_rejections: AtomicU32,

    start_time: Instant,
    last_completion: Mutex<Option<Instant>>,

    total_latency_ms: AtomicU64,
    min_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,

    prometheus: PrometheusMetrics,
}

impl Default for MetricsCollector {
    fn default() -> Self { Self::new() }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            jobs_dispatched: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
            jobs_expired: AtomicU64::new(0),
            stale_submits: AtomicU64::new(0),
            pending_jobs: AtomicU64::new(0),
            connectivity_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            device_connected: AtomicBool::new(false),
            device_connections: AtomicU64::new(0),
            consecutive_rejections: AtomicU32::new(0),
            start_time: Instant::now(),
            last_completion: Mutex::new(None),
            total_latency_ms: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            prometheus: PrometheusMetrics::new(),
        }
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        self.prometheus.requests_received.inc();
    }

    pub fn record_dispatch(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        self.consecutive_rejections.store(0, Ordering::Relaxed);
        self.prometheus.jobs_dispatched.inc();
    }

    /// A requester turned away because no device was connected.
    pub fn record_rejection(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
        self.consecutive_rejections.fetch_add(1, Ordering::Relaxed);
        self.prometheus.jobs_rejected.inc();
    }

    pub fn record_completion(&self, latency_ms: u64) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);
        if let Ok(mut last) = self.last_completion.lock() {
            *last = Some(Instant::now());
        }
        self.prometheus.jobs_completed.inc();
        self.prometheus.proof_latency_ms.observe(latency_ms as f64);
    }

    pub fn record_expiry(&self, count: u64) {
        self.jobs_expired.fetch_add(count, Ordering::Relaxed);
        self.prometheus.jobs_expired.inc_by(count);
    }

    pub fn record_stale_submit(&self) {
        self.stale_submits.fetch_add(1, Ordering::Relaxed);
        self.prometheus.stale_submits.inc();
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending_jobs.store(pending as u64, Ordering::Relaxed);
        self.prometheus.pending_jobs.set(pending as i64);
    }

    pub fn record_device_connected(&self) {
        self.device_connections.fetch_add(1, Ordering::Relaxed);
        self.device_connected.store(true, Ordering::Relaxed);
        self.prometheus.device_connections.inc();
        self.prometheus.device_connected.set(1);
    }

    pub fn record_device_disconnected(&self) {
        self.device_connected.store(false, Ordering::Relaxed);
        self.prometheus.device_connected.set(0);
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Connectivity => self.connectivity_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Protocol => self.protocol_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Request => self.request_errors.fetch_add(1, Ordering::Relaxed),
        };
        self.prometheus.record_error(error_type);
    }

    pub fn get_metrics(&self) -> Metrics {
        let jobs_completed = self.jobs_completed.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let min_latency_ms = self.min_latency_ms.load(Ordering::Relaxed);

        let average_latency_ms = if jobs_completed > 0 {
            total_latency_ms as f64 / jobs_completed as f64
        } else {
            0.0
        };

        let uptime_seconds = self.start_time.elapsed().as_secs();

        let last_completed_job = match self.last_completion.lock() {
            Ok(last) => last.map(|t| t.duration_since(self.start_time).as_secs()),
            Err(_) => None,
        };

        let proofs_per_second = if uptime_seconds > 0 {
            jobs_completed as f64 / uptime_seconds as f64
        } else {
            0.0
        };

        Metrics {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_completed,
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            jobs_expired: self.jobs_expired.load(Ordering::Relaxed),
            stale_submits: self.stale_submits.load(Ordering::Relaxed),
            pending_jobs: self.pending_jobs.load(Ordering::Relaxed),
            average_latency_ms,
            min_latency_ms: if min_latency_ms == u64::MAX { 0 } else { min_latency_ms },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            connectivity_errors: self.connectivity_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            device_connected: self.device_connected.load(Ordering::Relaxed),
            device_connections: self.device_connections.load(Ordering::Relaxed),
            consecutive_rejections: self.consecutive_rejections.load(Ordering::Relaxed),
            uptime_seconds,
            last_completed_job,
            proofs_per_second,
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let connected = self.device_connected.load(Ordering::Relaxed);
        let rejections = self.consecutive_rejections.load(Ordering::Relaxed);
        let dispatched = self.jobs_dispatched.load(Ordering::Relaxed);
        let expired = self.jobs_expired.load(Ordering::Relaxed);

        let expiry_rate = if dispatched > 0 {
            expired as f64 / dispatched as f64
        } else {
            0.0
        };

        if !connected && rejections >= 10 {
            HealthStatus::Critical
        } else if !connected {
            HealthStatus::Unhealthy
        } else if expiry_rate > 0.2 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn export_prometheus(&self) -> Result<String, std::fmt::Error> {
        self.prometheus.uptime_seconds.set(self.start_time.elapsed().as_secs() as i64);
        self.prometheus.export_metrics()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Connectivity,
    Protocol,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_counters() {
        let m = MetricsCollector::new();
        m.record_request();
        m.record_dispatch();
        m.record_completion(40);
        m.record_completion(10);
        m.record_stale_submit();
        m.set_pending(3);
        let snap = m.get_metrics();
        assert_eq!(snap.requests_received, 1);
        assert_eq!(snap.jobs_completed, 2);
        assert_eq!(snap.min_latency_ms, 10);
        assert_eq!(snap.max_latency_ms, 40);
        assert_eq!(snap.average_latency_ms, 25.0);
        assert_eq!(snap.stale_submits, 1);
        assert_eq!(snap.pending_jobs, 3);
        assert!(snap.last_completed_job.is_some());
    }

    #[test]
    fn health_follows_device_and_rejections() {
        let m = MetricsCollector::new();
        assert_eq!(m.get_health_status(), HealthStatus::Unhealthy);
        for _ in 0..10 {
            m.record_rejection();
        }
        assert_eq!(m.get_health_status(), HealthStatus::Critical);
        m.record_device_connected();
        assert_eq!(m.get_health_status(), HealthStatus::Healthy);
        m.record_dispatch();
        m.record_expiry(1);
        assert_eq!(m.get_health_status(), HealthStatus::Degraded);
        m.record_device_disconnected();
        assert_eq!(m.get_health_status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn prometheus_export_names() {
        let m = MetricsCollector::new();
        m.record_error(ErrorType::Protocol);
        let text = m.export_prometheus().unwrap();
        assert!(text.contains("silicon_bridge_protocol_errors_total 1"));
        assert!(text.contains("silicon_bridge_uptime_seconds"));
    }
}
