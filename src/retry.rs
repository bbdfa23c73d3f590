use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::SourceError;

/// Bounded exponential backoff around a single remote call.
///
/// This is the only place failure/backoff semantics live: connectors hand
/// their classified call to [`RetryPolicy::call`] and never run retry loops
/// of their own. Transient failures are retried up to `max_attempts` total
/// calls with `base_delay * multiplier^n` sleeps, scaled by a symmetric
/// jitter factor. Fatal failures short-circuit on the first attempt.
/// Connectors issuing several requests in a row call [`RetryPolicy::pause`]
/// between them to respect source-side rate limits; a successful call itself
/// never sleeps.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    pub rate_limit_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
        }
    }

    pub async fn call<F, Fut, T>(&self, mut operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err @ SourceError::Fatal(_)) => {
                    warn!("Fatal source error, not retrying: {err}");
                    return Err(err);
                }
                Err(SourceError::Transient(msg)) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            "Giving up after {} attempts: {msg}",
                            self.max_attempts
                        );
                        return Err(SourceError::Transient(format!(
                            "{msg} (after {} attempts)",
                            self.max_attempts
                        )));
                    }
                    let delay = self.backoff_delay(attempt);
                    debug!(
                        "Attempt {}/{} failed: {msg}. Retrying in {:?}...",
                        attempt, self.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Spacing between consecutive requests to the same source. Placed
    /// between a connector's loop iterations, never after its last request.
    pub async fn pause(&self) {
        tokio::time::sleep(self.rate_limit_delay).await;
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((exp * factor).max(0.0))
    }
}
