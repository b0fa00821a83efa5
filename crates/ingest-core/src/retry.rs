use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// A retry policy for one call site. Explicit per-endpoint policies replace
/// the single global retry decorator the source wrapped every external call
/// in.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            multiplier: 2.0,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let jitter: f64 = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()) * jitter)
    }
}

/// Runs `call` under `policy`, retrying while `is_retryable` returns true.
/// Returns the first success or the last error once attempts are exhausted.
pub async fn retry<T, E, F, Fut, R>(policy: RetryPolicy, mut call: F, is_retryable: R) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < policy.max_attempts && is_retryable(&e) => {
                let delay = policy.backoff_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
