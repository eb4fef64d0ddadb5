//! Bounded retry with backoff for single-account operations
//!
//! One executor serves every call site; what differs between login, check-in
//! and token calls is only the [`RetryPolicy`]. The executor reads
//! [`CheckinError::disposition`] to decide between giving up, backing off
//! exponentially (rate limiting) or backing off linearly (transient trouble).

use crate::config::RetryConfig;
use crate::errors::{CheckinError, Disposition};
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
    pub transient_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            transient_delay: Duration::from_millis(config.transient_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt + jitter, max_delay)`. `attempt` is zero-based.
    pub fn rate_limit_delay(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter.min(self.jitter_cap()))
            .min(self.max_delay)
    }

    /// `transient_delay * (attempt + 1)`, capped at `max_delay`.
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        self.transient_delay
            .saturating_mul(attempt.saturating_add(1))
            .min(self.max_delay)
    }

    /// Jitter never exceeds the base delay, which keeps successive
    /// rate-limit delays non-decreasing.
    fn jitter_cap(&self) -> Duration {
        self.jitter.min(self.base_delay)
    }

    fn sample_jitter(&self) -> Duration {
        let cap = self.jitter_cap().as_millis() as u64;
        if cap == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..cap))
    }
}

/// Suspends the current task between attempts and between accounts.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, CheckinError>,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

impl<T> RetryReport<T> {
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    pause: Arc<dyn Pause>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pause: Arc::new(TokioPause),
        }
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of
    /// attempts. `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CheckinError>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut delays = Vec::new();
        let mut attempt = 0;

        loop {
            let error = match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        log::info!("{}: succeeded on attempt {}/{}", label, attempt + 1, max_attempts);
                    }
                    return RetryReport {
                        result: Ok(value),
                        attempts: attempt + 1,
                        delays,
                    };
                }
                Err(error) => error,
            };

            let disposition = error.disposition();
            let last_attempt = attempt + 1 >= max_attempts;
            if disposition == Disposition::Permanent || last_attempt {
                if disposition != Disposition::Permanent {
                    log::error!("{}: giving up after {} attempt(s): {}", label, attempt + 1, error);
                }
                return RetryReport {
                    result: Err(error),
                    attempts: attempt + 1,
                    delays,
                };
            }

            let delay = match disposition {
                Disposition::RateLimited => {
                    self.policy.rate_limit_delay(attempt, self.policy.sample_jitter())
                }
                _ => self.policy.transient_delay(attempt),
            };
            log::warn!(
                "{}: attempt {}/{} failed ({}), retrying in {:.1}s",
                label,
                attempt + 1,
                max_attempts,
                error,
                delay.as_secs_f64()
            );
            self.pause.pause(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}
