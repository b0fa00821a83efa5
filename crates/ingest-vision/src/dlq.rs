use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

fn delivery_count_key(message_id: &str) -> String {
    format!("vision:deliveries:{message_id}")
}

/// Per-message-id delivery counter (spec §4.10: DLQ after `MAX_DELIVERIES`).
/// Separate from the stream's own pending-entry delivery count since that
/// one isn't surfaced by `EventLogClient::consume`.
pub async fn record_delivery(conn: &ConnectionManager, message_id: &str) -> Result<u32> {
    let mut conn = conn.clone();
    let count: u32 = conn.incr(delivery_count_key(message_id), 1).await?;
    if count == 1 {
        let _: () = conn.expire(delivery_count_key(message_id), 24 * 3600).await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_count_key_is_scoped_to_message_id() {
        assert_eq!(delivery_count_key("123-0"), "vision:deliveries:123-0");
    }
}
