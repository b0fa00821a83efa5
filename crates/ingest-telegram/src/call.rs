use std::future::Future;
use std::time::Duration;

use ingest_ratelimit::FloodWaitManager;
use tracing::warn;

use crate::error::{Result, TelegramError};

const MAX_ATTEMPTS: u32 = 3;

/// Reproduces `TelethonClientWrapper.call`'s dual-layer flood-wait policy:
/// sleep out any already-known wait before calling, and on a fresh
/// flood-wait record it through [`FloodWaitManager`] then retry with
/// exponential backoff (`2^attempt` seconds) up to `MAX_ATTEMPTS`, re-raising
/// on the last attempt instead of retrying forever.
pub struct TelegramCall<'a> {
    floodwait: &'a FloodWaitManager,
    account_id: &'a str,
    method: &'a str,
}

impl<'a> TelegramCall<'a> {
    pub fn new(floodwait: &'a FloodWaitManager, account_id: &'a str, method: &'a str) -> Self {
        Self { floodwait, account_id, method }
    }

    pub async fn invoke<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 0..MAX_ATTEMPTS {
            let wait = self.floodwait.wait_time(self.account_id, self.method).await;
            if wait > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            }

            match call().await {
                Ok(v) => return Ok(v),
                Err(TelegramError::FloodWait(seconds)) => {
                    self.floodwait
                        .handle_floodwait(self.account_id, self.method, seconds)
                        .await?;
                    if attempt + 1 == MAX_ATTEMPTS {
                        return Err(TelegramError::FloodWait(seconds));
                    }
                    let backoff = 2u64.saturating_pow(attempt + 1);
                    warn!(attempt, backoff, method = self.method, "retrying after flood-wait");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop always returns within MAX_ATTEMPTS")
    }
}
