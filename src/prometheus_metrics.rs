
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};
use crate::metrics::ErrorType;

pub struct PrometheusMetrics {
    registry: Registry,

    // Counters
    pub(crate) requests_received: Counter,
    pub(crate) jobs_dispatched: Counter,
    pub(crate) jobs_completed: Counter,
    pub(crate) jobs_rejected: Counter,
    pub(crate) jobs_expired: Counter,
    pub(crate) stale_submits: Counter,
    pub(crate) device_connections: Counter,
    connectivity_errors: Counter,
    protocol_errors: Counter,
    request_errors: Counter,

    // Gauges
    pub(crate) uptime_seconds: Gauge<i64>,
    pub(crate) pending_jobs: Gauge<i64>,
    pub(crate) device_connected: Gauge<i64>,

    // Histograms
    pub(crate) proof_latency_ms: Histogram,
}

impl Default for PrometheusMetrics {
    fn default() -> Self { Self::new() }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_received = Counter::default();
        let jobs_dispatched = Counter::default();
        let jobs_completed = Counter::default();
        let jobs_rejected = Counter::default();
        let jobs_expired = Counter::default();
        let stale_submits = Counter::default();
        let device_connections = Counter::default();
        let connectivity_errors = Counter::default();
        let protocol_errors = Counter::default();
        let request_errors = Counter::default();

        let uptime_seconds = Gauge::default();
        let pending_jobs = Gauge::default();
        let device_connected = Gauge::default();

        // Proofs at difficulty 4 land in well under a second on real hardware.
        let proof_latency_ms = Histogram::new(
            [5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 30000.0].into_iter()
        );

        let counters = [
            ("silicon_bridge_requests_received", "API requests accepted", &requests_received),
            ("silicon_bridge_jobs_dispatched", "Jobs pushed to the device", &jobs_dispatched),
            ("silicon_bridge_jobs_completed", "Jobs answered with a proof", &jobs_completed),
            ("silicon_bridge_jobs_rejected", "Requests refused while no device was connected", &jobs_rejected),
            ("silicon_bridge_jobs_expired", "Pending jobs dropped after the job deadline", &jobs_expired),
            ("silicon_bridge_stale_submits", "Submits with no waiting requester", &stale_submits),
            ("silicon_bridge_device_connections", "Device connections accepted", &device_connections),
            ("silicon_bridge_connectivity_errors", "Socket failures on either listener", &connectivity_errors),
            ("silicon_bridge_protocol_errors", "Malformed stratum lines from the device", &protocol_errors),
            ("silicon_bridge_request_errors", "Malformed API requests", &request_errors),
        ];
        for (name, help, counter) in counters {
            registry.register(name, help, counter.clone());
        }

        registry.register(
            "silicon_bridge_uptime_seconds",
            "Bridge uptime in seconds",
            uptime_seconds.clone(),
        );
        registry.register(
            "silicon_bridge_pending_jobs",
            "Jobs waiting for a device submit",
            pending_jobs.clone(),
        );
        registry.register(
            "silicon_bridge_device_connected",
            "1 while a device session is active",
            device_connected.clone(),
        );
        registry.register(
            "silicon_bridge_proof_latency_ms",
            "Time from dispatch to submit in milliseconds",
            proof_latency_ms.clone(),
        );

        Self {
            registry,
            requests_received,
            jobs_dispatched,
            jobs_completed,
            jobs_rejected,
            jobs_expired,
            stale_submits,
            device_connections,
            connectivity_errors,
            protocol_errors,
            request_errors,
            uptime_seconds,
            pending_jobs,
            device_connected,
            proof_latency_ms,
        }
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Connectivity => self.connectivity_errors.inc(),
            ErrorType::Protocol => self.protocol_errors.inc(),
            ErrorType::Request => self.request_errors.inc(),
        };
    }

    pub fn export_metrics(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
