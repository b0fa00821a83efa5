use redis::aio::ConnectionManager;
use redis::Script;
use tracing::warn;

use crate::keys::{rate_limit_key, RateScope};

#[derive(Debug, Clone, Copy)]
pub struct CheckResult {
    pub allowed: bool,
    pub current_count: u32,
    pub remaining: u32,
    pub reset_in_secs: u32,
}

/// Atomic `INCR` + `EXPIRE` under one Lua script so concurrent callers never
/// race past the limit.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], 60)
end
return count
"#;

/// Fixed 60-second bucket sliding-window limiter backed by the shared KV.
pub struct SlidingWindowLimiter {
    conn: ConnectionManager,
}

impl SlidingWindowLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Checks and increments `scope:id`'s counter for the current minute
    /// bucket. On KV failure, fails open (`Allowed = true`) and logs: a
    /// starved caller is worse than an occasional overshoot.
    pub async fn check(&self, scope: RateScope, id: &str, limit_per_minute: u32) -> CheckResult {
        let minute_bucket = chrono::Utc::now().timestamp() / 60;
        let key = rate_limit_key(scope, id, minute_bucket);

        let mut conn = self.conn.clone();
        let result: redis::RedisResult<i64> = Script::new(SLIDING_WINDOW_SCRIPT)
            .key(&key)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(count) => {
                let count = count.max(0) as u32;
                CheckResult {
                    allowed: count <= limit_per_minute,
                    current_count: count,
                    remaining: limit_per_minute.saturating_sub(count),
                    reset_in_secs: 60 - (chrono::Utc::now().timestamp() % 60) as u32,
                }
            }
            Err(e) => {
                warn!(error = %e, "shared KV unavailable, failing open on rate limit check");
                CheckResult {
                    allowed: true,
                    current_count: 0,
                    remaining: limit_per_minute,
                    reset_in_secs: 60,
                }
            }
        }
    }
}
