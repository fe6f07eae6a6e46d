use crate::metrics_defs::RETRY_ATTEMPTS_FAILED;
use shared::counter;
use std::fmt::Display;
use std::future::Future;
use tokio::time::{Duration, sleep};

/// Exponential backoff with a bounded number of attempts.
///
/// The delay after failed attempt `n` (1-based) is `multiplier * 2^(n-1)`,
/// raised to at least `min_delay` and capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.multiplier
            .saturating_mul(exp)
            .min(self.max_delay)
            .max(self.min_delay)
    }

    /// Runs `operation` until it succeeds or the attempts are exhausted, in
    /// which case the last error is returned. The closure receives the
    /// 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, name: &'static str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    counter!(RETRY_ATTEMPTS_FAILED, "operation" => name).increment(1);

                    if attempt >= max_attempts {
                        tracing::warn!(
                            operation = name,
                            attempt,
                            "giving up after {max_attempts} attempts: {e}"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying: {e}"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
