use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use crate::health::HealthChecker;

pub struct HealthServer {
    health_checker: Arc<HealthChecker>,
    port: u16,
}

impl HealthServer {
    pub fn new(health_checker: Arc<HealthChecker>, port: u16) -> Self {
        Self {
            health_checker,
            port,
        }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(format!("127.0.0.1:{}", self.port)).await?;
        info!(port = self.port, "health server listening");

        loop {
            let (mut socket, peer) = listener.accept().await?;
            let health_checker = Arc::clone(&self.health_checker);

            tokio::spawn(async move {
                let mut buffer = [0; 1024];
                let n = match socket.read(&mut buffer).await {
                    Ok(0) => return,
                    Ok(n) => n,
                    Err(_) => return,
                };

                let request = String::from_utf8_lossy(&buffer[..n]);
                let response = Self::handle_request(&request, &health_checker);

                if let Err(e) = socket.write_all(response.as_bytes()).await {
                    debug!(%peer, error = %e, "health response not delivered");
                }
            });
        }
    }

    pub fn handle_request(request: &str, health_checker: &HealthChecker) -> String {
        let Some(request_line) = request.lines().next() else {
            return Self::error_response(400, "Bad Request");
        };

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return Self::error_response(400, "Bad Request");
        }

        match (parts[0], parts[1]) {
            ("GET", "/health") => {
                let health = health_checker.get_health();
                match serde_json::to_string(&health) {
                    Ok(json) => Self::json_response(200, &json),
                    Err(_) => Self::error_response(500, "Internal Server Error"),
                }
            }
            ("GET", "/metrics") => match health_checker.prometheus_text() {
                Ok(text) => Self::response(200, "text/plain; version=0.0.4", &text),
                Err(_) => Self::error_response(500, "Internal Server Error"),
            },
            ("GET", "/status") => {
                let status = health_checker.get_detailed_status();
                match serde_json::to_string(&status) {
                    Ok(json) => Self::json_response(200, &json),
                    Err(_) => Self::error_response(500, "Internal Server Error"),
                }
            }
            ("GET", "/") => {
                let html = r#"
<!DOCTYPE html>
<html>
<head>
    <title>silicon-bridge</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .endpoint { margin: 20px 0; padding: 10px; background: #f5f5f5; }
        .endpoint h3 { margin: 0 0 10px 0; }
        .endpoint a { color: #0066cc; text-decoration: none; }
    </style>
</head>
<body>
    <h1>silicon-bridge</h1>
    <div class="endpoint">
        <h3><a href="/health">/health</a></h3>
        <p>Device connectivity and uptime</p>
    </div>
    <div class="endpoint">
        <h3><a href="/metrics">/metrics</a></h3>
        <p>Prometheus counters for jobs, submits and errors</p>
    </div>
    <div class="endpoint">
        <h3><a href="/status">/status</a></h3>
        <p>Device phase, pending jobs and configuration</p>
    </div>
</body>
</html>
                "#;
                Self::response(200, "text/html", html)
            }
            _ => Self::error_response(404, "Not Found"),
        }
    }

    fn response(status: u16, content_type: &str, body: &str) -> String {
        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            _ => "Internal Server Error",
        };
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            content_type,
            body.len(),
            body
        )
    }

    fn json_response(status: u16, body: &str) -> String {
        Self::response(status, "application/json", body)
    }

    fn error_response(status: u16, message: &str) -> String {
        let body = format!("{{\"error\": \"{}\"}}", message);
        Self::json_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeState;
    use crate::config::Config;
    use crate::metrics::MetricsCollector;

    fn checker() -> HealthChecker {
        let metrics = Arc::new(MetricsCollector::new());
        let bridge = Arc::new(BridgeState::new(Config::default(), metrics.clone()));
        HealthChecker::new(metrics, bridge, Config::default())
    }

    #[test]
    fn routes() {
        let checker = checker();
        let health = HealthServer::handle_request("GET /health HTTP/1.1\r\n\r\n", &checker);
        assert!(health.starts_with("HTTP/1.1 200 OK"));
        assert!(health.contains("\"status\":\"unhealthy\""));

        let metrics = HealthServer::handle_request("GET /metrics HTTP/1.1\r\n\r\n", &checker);
        assert!(metrics.contains("text/plain"));
        assert!(metrics.contains("silicon_bridge_jobs_dispatched_total"));

        let status = HealthServer::handle_request("GET /status HTTP/1.1\r\n\r\n", &checker);
        assert!(status.contains("\"pending_jobs\":0"));

        assert!(HealthServer::handle_request("GET /nope HTTP/1.1\r\n\r\n", &checker).starts_with("HTTP/1.1 404"));
        assert!(HealthServer::handle_request("", &checker).starts_with("HTTP/1.1 400"));
    }
}
