use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

/// Errors that may succeed when the same call is repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Bounded exponential backoff with jitter for collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    /// Backoff before retry number `attempt` (0-based), without jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 0u32;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let backoff = self.backoff_for(attempt);
                    // jitter: 0-50% of the backoff
                    let jitter = backoff.mul_f64(rand::random::<f64>() * 0.5);

                    debug!(
                        operation,
                        attempt = attempt + 1,
                        backoff_ms = (backoff + jitter).as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );

                    sleep(backoff + jitter).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
