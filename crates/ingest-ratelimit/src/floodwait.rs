use chrono::{Timelike, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use crate::error::Result;
use crate::keys::{cooldown_key, floodwait_key};

const BASE_BATCH_SIZE: u32 = 50;

/// Per-account/method flood-wait locks and channel cool-downs, synced via the
/// shared KV so every process sees the same state.
pub struct FloodWaitManager {
    conn: ConnectionManager,
}

impl FloodWaitManager {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Records a flood-wait: sets `floodwait:{account}:{method}` to the
    /// unlock timestamp with TTL `wait + 60s` buffer, increments the metric,
    /// and sleeps out `wait_seconds`. Mirrors the dual bookkeeping the
    /// Python original performed in `handle_floodwait`.
    pub async fn handle_floodwait(&self, account_id: &str, method: &str, wait_seconds: u64) -> Result<()> {
        let key = floodwait_key(account_id, method);
        let unlock_time = Utc::now().timestamp() as f64 + wait_seconds as f64;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&key, unlock_time.to_string(), wait_seconds + 60)
            .await?;

        metrics::counter!("telethon_floodwait_total", "account_id" => account_id.to_string(), "method" => method.to_string()).increment(1);
        metrics::histogram!("telethon_floodwait_duration_seconds", "account_id" => account_id.to_string(), "method" => method.to_string())
            .record(wait_seconds as f64);

        warn!(account_id, method, wait_seconds, "flood-wait detected");
        tokio::time::sleep(std::time::Duration::from_secs(wait_seconds)).await;
        Ok(())
    }

    pub async fn is_rate_limited(&self, account_id: &str, method: &str) -> bool {
        self.wait_time(account_id, method).await > 0.0
    }

    /// Remaining wait time in seconds (0 if not locked). Never errors: a KV
    /// miss or failure means "not limited".
    pub async fn wait_time(&self, account_id: &str, method: &str) -> f64 {
        let key = floodwait_key(account_id, method);
        let mut conn = self.conn.clone();
        let stored: redis::RedisResult<Option<String>> = conn.get(&key).await;
        match stored {
            Ok(Some(raw)) => {
                let unlock_time: f64 = raw.parse().unwrap_or(0.0);
                (unlock_time - Utc::now().timestamp() as f64).max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Recommended batch size for `get_messages`-style calls, scaled by
    /// hour-of-day and any pending flood-wait:
    /// night `2..6h` -> 2.0x, business `10..18h` -> 0.5x, evening `18..22h`
    /// -> 0.75x, else 1.0x; halved again if the pending wait exceeds 30s.
    pub async fn adaptive_batch_size(&self, account_id: &str, hour: Option<u32>) -> u32 {
        let hour = hour.unwrap_or_else(|| Utc::now().hour());
        let mut multiplier = if (2..6).contains(&hour) {
            2.0
        } else if (10..18).contains(&hour) {
            0.5
        } else if (18..22).contains(&hour) {
            0.75
        } else {
            1.0
        };

        if self.wait_time(account_id, "get_messages").await > 30.0 {
            multiplier *= 0.5;
        }

        (BASE_BATCH_SIZE as f64 * multiplier) as u32
    }

    /// Moves `channel_id` into cool-down for `seconds`. Called when the
    /// platform returns a flood-wait longer than 60s on a channel-scoped
    /// call.
    pub async fn enter_cooldown(&self, channel_id: &str, seconds: u64) -> Result<()> {
        let key = cooldown_key(channel_id);
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(&key, "1", seconds).await?;
        Ok(())
    }

    pub async fn is_in_cooldown(&self, channel_id: &str) -> bool {
        let key = cooldown_key(channel_id);
        let mut conn = self.conn.clone();
        let exists: redis::RedisResult<bool> = conn.exists(&key).await;
        exists.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    // Hour-tier math is pure enough to test directly without a live KV by
    // re-deriving the multiplier the same way adaptive_batch_size does.
    fn multiplier_for_hour(hour: u32) -> f64 {
        if (2..6).contains(&hour) {
            2.0
        } else if (10..18).contains(&hour) {
            0.5
        } else if (18..22).contains(&hour) {
            0.75
        } else {
            1.0
        }
    }

    #[test]
    fn four_tiers_match_the_original_schedule() {
        assert_eq!(multiplier_for_hour(3), 2.0);
        assert_eq!(multiplier_for_hour(12), 0.5);
        assert_eq!(multiplier_for_hour(19), 0.75);
        assert_eq!(multiplier_for_hour(0), 1.0);
        assert_eq!(multiplier_for_hour(23), 1.0);
    }
}
