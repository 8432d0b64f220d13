use std::thread;
use std::time::Duration;

use super::error::JobError;
use crate::config::JobsConfig;

/// Bounded retries with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.retry_backoff_ms))
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    /// `on_retry` is told about each retry before its delay.
    pub fn run<T, F, R>(&self, mut op: F, mut on_retry: R) -> Result<T, JobError>
    where
        F: FnMut() -> Result<T, JobError>,
        R: FnMut(u32, &JobError),
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Retrying after transient failure (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    on_retry(attempt, &e);
                    thread::sleep(self.delay(attempt));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}
