use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;

/// Errors that may succeed when the operation is simply tried again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.get_retry_delay(),
            ..Self::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier)
                .min(self.max_retry_delay.as_secs_f64())
        )
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    pub async fn execute_with_retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut delay = self.retry_delay;
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) if attempt < self.max_retries && error.is_retryable() => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.max_retries, error = %error, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                }
                Err(error) => return Err(error),
            }
        }
    }
}
