//! Bounded retry with exponential backoff.
//!
//! The policy is a plain value: `delay_for` is pure, and `run` drives an
//! attempt closure until it succeeds, the attempts run out, or the job is
//! cancelled. Cancellation is observed between attempts, never during one.

use crate::config::UploadConfig;
use crate::utils::EngineError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: EngineError },
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(max_attempts: u32, config: &UploadConfig) -> Self {
        Self::new(max_attempts, config.base_delay(), config.max_delay())
    }

    /// Delay after the failed attempt with 0-based index `attempt`:
    /// `base_delay × 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt_fn: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled { attempts: attempt };
            }

            match attempt_fn(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt + 1,
                    }
                }
                Err(error) => {
                    let attempts = attempt + 1;
                    if attempts >= self.max_attempts || !error.is_retryable() {
                        return RetryOutcome::Exhausted {
                            attempts,
                            last_error: error,
                        };
                    }

                    let delay = self.delay_for(attempt);
                    warn!(attempt = attempts, ?delay, error = %error, "Attempt failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
