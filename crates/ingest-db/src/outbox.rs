use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{DbError, Result};

/// One row of the write-ahead outbox the relay (C15) drains. `payload` is
/// the full envelope JSON exactly as it would have been `XADD`ed, so the
/// relay can replay it verbatim via `EventLogClient::publish_raw` without
/// re-deriving it from typed state.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub stream: String,
    pub event: String,
    pub idempotency_key: String,
    pub payload: serde_json::Value,
    pub retry_count: i32,
}

/// Durably records an event the caller's transaction wants published, before
/// it has actually reached the event log. Call this inside the same
/// transaction as the business write it accompanies, so a crash between the
/// two never silently drops the event.
pub async fn insert_outbox(
    pool: &Pool,
    stream: &str,
    event: &str,
    idempotency_key: &str,
    payload: &serde_json::Value,
) -> Result<Uuid> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "INSERT INTO outbox_events (stream, event, idempotency_key, payload)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
            &[&stream, &event, &idempotency_key, payload],
        )
        .await
        .map_err(DbError::from_pg)?;
    Ok(row.get("id"))
}

/// Rows ready to (re-)publish: freshly pending, or previously failed with a
/// `next_retry_at` that has elapsed. Ordered by `created_at` so publication
/// order matches write order, same as the source outbox processor.
pub async fn fetch_pending_outbox(pool: &Pool, batch: i64) -> Result<Vec<OutboxRow>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id, stream, event, idempotency_key, payload, retry_count
             FROM outbox_events
             WHERE status = 'pending'
                OR (status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= now())
             ORDER BY created_at ASC
             LIMIT $1",
            &[&batch],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(rows
        .into_iter()
        .map(|row| OutboxRow {
            id: row.get("id"),
            stream: row.get("stream"),
            event: row.get("event"),
            idempotency_key: row.get("idempotency_key"),
            payload: row.get("payload"),
            retry_count: row.get("retry_count"),
        })
        .collect())
}

pub async fn mark_outbox_sent(pool: &Pool, id: Uuid) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute("UPDATE outbox_events SET status = 'sent', sent_at = now() WHERE id = $1", &[&id])
        .await
        .map_err(DbError::from_pg)?;
    Ok(())
}

pub async fn mark_outbox_failed(pool: &Pool, id: Uuid, error: &str, next_retry_at: DateTime<Utc>) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "UPDATE outbox_events
             SET status = 'failed', retry_count = retry_count + 1, last_error = $2, next_retry_at = $3
             WHERE id = $1",
            &[&id, &error, &next_retry_at],
        )
        .await
        .map_err(DbError::from_pg)?;
    Ok(())
}
