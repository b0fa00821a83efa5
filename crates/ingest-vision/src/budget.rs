use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

fn budget_key(tenant_id: &str) -> String {
    format!("vision:budget:{tenant_id}:{}", Utc::now().format("%Y%m%d"))
}

/// Per-tenant daily token budget, tracked as a Redis counter that resets by
/// letting the day's key expire (TTL 25h to tolerate clock skew at the
/// boundary) rather than by an explicit reset job.
pub struct BudgetGate {
    conn: ConnectionManager,
    daily_limit: u64,
}

impl BudgetGate {
    pub fn new(conn: ConnectionManager, daily_limit: u64) -> Self {
        Self { conn, daily_limit }
    }

    /// Reserves `estimated_tokens` against today's budget. Returns `false`
    /// (and does not charge the budget) when the reservation would exceed
    /// the daily cap.
    pub async fn try_reserve(&self, tenant_id: &str, estimated_tokens: u64) -> Result<bool> {
        let key = budget_key(tenant_id);
        let mut conn = self.conn.clone();
        let current: u64 = conn.get(&key).await.unwrap_or(0);
        if current + estimated_tokens > self.daily_limit {
            return Ok(false);
        }
        let new_total: u64 = conn.incr(&key, estimated_tokens).await?;
        if new_total == estimated_tokens {
            let _: () = conn.expire(&key, 25 * 3600).await?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_key_is_scoped_to_tenant_and_day() {
        let key = budget_key("t1");
        assert!(key.starts_with("vision:budget:t1:"));
    }
}
