//! Bounded exponential backoff for transient failures.
//!
//! Only errors that report [`crate::error::ShadowError::is_transient`] are retried.
//! Everything else, a duplicate post or a declined wallet, is returned on
//! the first attempt.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::Result;

/// Upper bound for a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay(),
        }
    }

    /// Sleep before retry number `attempt` (1-based): base, 2x, 4x, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget
    /// runs out. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
