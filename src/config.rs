use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DEFAULT_NBITS, DEFAULT_VERSION};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Listeners
    pub stratum_addr: SocketAddr,
    pub api_addr: SocketAddr,
    pub health_port: u16,

    // Job template pushed to the device
    pub device_difficulty: f64,
    pub block_version: String,
    pub nbits: String,
    pub subscription_id: String,
    pub extranonce1: String,
    pub extranonce2_size: u32,
    pub version_rolling_mask: String,

    // Job lifecycle
    pub job_timeout_ms: u64,
    pub max_concurrent_requests: u32,
    pub max_request_bytes: usize,

    // Monitoring and logging
    pub log_level: String,
    pub metrics_enabled: bool,

    // Client side
    pub bridge_addr: SocketAddr,
    pub client_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub signature_status: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stratum_addr: SocketAddr::from(([0, 0, 0, 0], 3333)),
            api_addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            health_port: 8090,

            device_difficulty: 4.0,
            block_version: DEFAULT_VERSION.to_string(),
            nbits: DEFAULT_NBITS.to_string(),
            subscription_id: "ae6812eb4cd7735a302a8a9dd95cf71f".to_string(),
            extranonce1: "00000000".to_string(),
            extranonce2_size: 4,
            version_rolling_mask: "1fffe000".to_string(),

            job_timeout_ms: 120_000,
            max_concurrent_requests: 5,
            max_request_bytes: 4096,

            log_level: "info".to_string(),
            metrics_enabled: true,

            bridge_addr: SocketAddr::from(([127, 0, 0, 1], 4000)),
            client_timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1000,
            signature_status: "AUTHENTICATED_BY_BM1387".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = env::var(name) {
        *target = val.parse()
            .map_err(|_| ConfigError::InvalidEnvVar(name.to_string(), val))?;
    }
    Ok(())
}

fn string_var(name: &str, target: &mut String) {
    if let Ok(val) = env::var(name) {
        *target = val;
    }
}

fn check_hex_word(name: &str, value: &str) -> Result<(), ConfigError> {
    match hex::decode(value) {
        Ok(bytes) if bytes.len() == 4 => Ok(()),
        _ => Err(ConfigError::ValidationError(format!("{name} must be 8 hex characters"))),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        parse_var("STRATUM_ADDR", &mut config.stratum_addr)?;
        parse_var("API_ADDR", &mut config.api_addr)?;
        parse_var("HEALTH_PORT", &mut config.health_port)?;

        parse_var("DEVICE_DIFFICULTY", &mut config.device_difficulty)?;
        string_var("BLOCK_VERSION", &mut config.block_version);
        string_var("NBITS", &mut config.nbits);
        string_var("SUBSCRIPTION_ID", &mut config.subscription_id);
        string_var("EXTRANONCE1", &mut config.extranonce1);
        parse_var("EXTRANONCE2_SIZE", &mut config.extranonce2_size)?;
        string_var("VERSION_ROLLING_MASK", &mut config.version_rolling_mask);

        parse_var("JOB_TIMEOUT_MS", &mut config.job_timeout_ms)?;
        parse_var("MAX_CONCURRENT_REQUESTS", &mut config.max_concurrent_requests)?;
        parse_var("MAX_REQUEST_BYTES", &mut config.max_request_bytes)?;

        string_var("LOG_LEVEL", &mut config.log_level);
        if let Ok(val) = env::var("METRICS_ENABLED") {
            config.metrics_enabled = val == "1";
        }

        parse_var("BRIDGE_ADDR", &mut config.bridge_addr)?;
        parse_var("CLIENT_TIMEOUT_MS", &mut config.client_timeout_ms)?;
        parse_var("MAX_RETRIES", &mut config.max_retries)?;
        parse_var("RETRY_DELAY_MS", &mut config.retry_delay_ms)?;
        string_var("SIGNATURE_STATUS", &mut config.signature_status);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_hex_word("BLOCK_VERSION", &self.block_version)?;
        check_hex_word("NBITS", &self.nbits)?;
        check_hex_word("EXTRANONCE1", &self.extranonce1)?;
        check_hex_word("VERSION_ROLLING_MASK", &self.version_rolling_mask)?;

        if !(self.device_difficulty > 0.0) {
            return Err(ConfigError::ValidationError("DEVICE_DIFFICULTY must be greater than 0".to_string()));
        }

        if !(1..=8).contains(&self.extranonce2_size) {
            return Err(ConfigError::ValidationError("EXTRANONCE2_SIZE must be between 1 and 8".to_string()));
        }

        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::ValidationError("MAX_CONCURRENT_REQUESTS must be greater than 0".to_string()));
        }

        if self.max_request_bytes < 16 {
            return Err(ConfigError::ValidationError("MAX_REQUEST_BYTES is too small".to_string()));
        }

        if self.signature_status.is_empty() {
            return Err(ConfigError::ValidationError("SIGNATURE_STATUS must not be empty".to_string()));
        }

        Ok(())
    }

    /// `None` when expiry is disabled.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_ms > 0).then(|| Duration::from_millis(self.job_timeout_ms))
    }

    pub fn get_client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn get_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rolling_mask(&self) -> u32 {
        u32::from_str_radix(&self.version_rolling_mask, 16).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.stratum_addr.port(), 3333);
        assert_eq!(config.api_addr.port(), 4000);
        assert_eq!(config.job_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.rolling_mask(), 0x1fffe000);
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = Config::default();
        config.nbits = "1d00ff".into();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.device_difficulty = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.extranonce2_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_disables_expiry() {
        let config = Config { job_timeout_ms: 0, ..Config::default() };
        assert_eq!(config.job_timeout(), None);
    }
}
