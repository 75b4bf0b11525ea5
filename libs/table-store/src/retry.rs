use std::future::Future;
use std::time::Duration;

use fabric_api::FabricError;

/// Retry with linear backoff: after failed attempt `n` wait `delay * n`.
///
/// Only transient errors (see [`FabricError::is_transient`]) are retried;
/// every other error is returned at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }

    pub fn is_retryable(&self, err: &FabricError) -> bool {
        err.is_transient()
    }

    pub async fn run<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, FabricError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FabricError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(err) if self.is_retryable(&err) && attempt < self.max_attempts => {
                    let delay = self.delay * attempt;
                    tracing::warn!(
                        op = %op,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if self.is_retryable(&err) {
                        tracing::error!(op = %op, attempt, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
