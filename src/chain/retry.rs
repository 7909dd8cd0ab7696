//! Retry with exponential backoff and jitter
//!
//! Only [`HarvestError::TransientRpc`] failures (timeouts, 429s) are retried.
//! Anything else, such as a revert or a malformed response, is returned on
//! the first attempt. Reads that can legitimately come back empty, like a
//! zero balance check, are made directly.

use eyre::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::HarvestError;

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay before attempt `attempt + 1`: `base * 2^attempt * jitter`, jitter in [0.5, 1.5)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        let factor = 2u32.saturating_pow(attempt) as f64;
        self.base_delay.mul_f64(factor * jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 100)
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempts are used up.
///
/// A non-transient error is returned unchanged. Running out of attempts fails
/// with [`HarvestError::RetryExhausted`] carrying the last error.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", label, attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if !is_transient(&e) => {
                debug!("{} failed permanently on attempt {}: {}", label, attempt + 1, e);
                return Err(e);
            }
            Err(e) => {
                let is_last = attempt + 1 == policy.max_attempts;
                if !is_last {
                    let delay = policy.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt + 1,
                        policy.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    let last_error = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());

    Err(HarvestError::RetryExhausted {
        attempts: policy.max_attempts,
        last_error,
    }
    .into())
}

fn is_transient(err: &eyre::Report) -> bool {
    err.downcast_ref::<HarvestError>()
        .map(HarvestError::is_transient)
        .unwrap_or(false)
}
