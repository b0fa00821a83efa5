use std::time::Duration;

use ingest_events::Envelope;
use redis::aio::ConnectionManager;
use redis::streams::{StreamClaimOptions, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, instrument, warn};

use crate::error::{EventBusError, Result};

/// One delivered message: its stream id plus the decoded envelope.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub envelope: Envelope,
}

fn stream_key(topic: &str) -> String {
    format!("stream:{topic}")
}

fn dlq_key(topic: &str) -> String {
    format!("stream:{topic}:dlq")
}

/// Orders two stream IDs (`<ms>-<seq>`) numerically rather than
/// lexicographically, since a plain string compare breaks once the
/// millisecond part grows an extra digit.
fn stream_id_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    fn parts(id: &str) -> (u64, u64) {
        let mut it = id.splitn(2, '-');
        let ms = it.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let seq = it.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        (ms, seq)
    }
    parts(a).cmp(&parts(b))
}

/// Append-only ordered log client on top of Redis Streams, organised around
/// consumer groups. One [`EventLogClient`] is shared by every worker of a
/// process; `consumer` distinguishes physical processes within a group.
#[derive(Clone)]
pub struct EventLogClient {
    conn: ConnectionManager,
}

impl EventLogClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Ensures the consumer group exists on `topic`, creating the stream if
    /// needed. Call once per (topic, group) before `consume`.
    #[instrument(skip(self))]
    pub async fn ensure_group(&self, topic: &str, group: &str) -> Result<()> {
        let key = stream_key(topic);
        let mut conn = self.conn.clone();
        let res: redis::RedisResult<()> = conn.xgroup_create_mkstream(&key, group, "0").await;
        if let Err(e) = res {
            if !e.to_string().contains("BUSYGROUP") {
                return Err(EventBusError::Redis(e));
            }
        }
        Ok(())
    }

    /// Appends `envelope` to `topic`. Retry-safe: publishing the same logical
    /// event twice is fine, downstream idempotency guarantees single
    /// application.
    #[instrument(skip(self, envelope), fields(topic = %envelope.topic()))]
    pub async fn publish(&self, envelope: &Envelope) -> Result<String> {
        let key = stream_key(envelope.topic());
        let data = serde_json::to_string(envelope)?;
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&key, "*", &[("event", envelope.topic()), ("data", data.as_str())])
            .await?;
        metrics::counter!("events_published_total", "event_type" => envelope.topic().to_string(), "source" => "ingestd").increment(1);
        Ok(id)
    }

    /// Fetches up to `batch` new messages for `group`/`consumer`, blocking up
    /// to `block` when the stream is empty.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        batch: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>> {
        let key = stream_key(topic);
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(batch)
            .block(block.as_millis() as usize);
        let mut conn = self.conn.clone();
        let reply: StreamReadReply = conn.xread_options(&[&key], &[">"], &opts).await?;

        let mut out = Vec::new();
        for stream_key_reply in reply.keys {
            for entry in stream_key_reply.ids {
                let data: String = entry
                    .map
                    .get("data")
                    .and_then(|v| redis::from_redis_value::<String>(v).ok())
                    .ok_or_else(|| EventBusError::MalformedEntry(entry.id.clone()))?;
                let envelope: Envelope = serde_json::from_str(&data)?;
                out.push(Delivery {
                    id: entry.id,
                    envelope,
                });
            }
        }
        debug!(count = out.len(), "consumed batch");
        Ok(out)
    }

    /// Removes `id` from `group`'s pending-entry list.
    pub async fn ack(&self, topic: &str, group: &str, id: &str) -> Result<()> {
        let key = stream_key(topic);
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&key, group, &[id]).await?;
        Ok(())
    }

    /// Claims messages idle in another consumer's pending list longer than
    /// `min_idle`, handing them to `consumer` for reprocessing. This is what
    /// bounds lag after a crashed consumer.
    #[instrument(skip(self))]
    pub async fn reclaim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
    ) -> Result<Vec<Delivery>> {
        let key = stream_key(topic);
        let mut conn = self.conn.clone();

        let pending: redis::streams::StreamPendingCountReply = conn
            .xpending_count(&key, group, "-", "+", 100)
            .await?;
        let ids: Vec<String> = pending.ids.into_iter().map(|p| p.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let opts = StreamClaimOptions::default();
        let claimed: StreamReadReply = conn
            .xclaim_options(&key, group, consumer, min_idle.as_millis() as usize, &ids, opts)
            .await?;

        let mut out = Vec::new();
        for stream_key_reply in claimed.keys {
            for entry in stream_key_reply.ids {
                let data: String = entry
                    .map
                    .get("data")
                    .and_then(|v| redis::from_redis_value::<String>(v).ok())
                    .ok_or_else(|| EventBusError::MalformedEntry(entry.id.clone()))?;
                let envelope: Envelope = serde_json::from_str(&data)?;
                out.push(Delivery {
                    id: entry.id,
                    envelope,
                });
            }
        }
        if !out.is_empty() {
            warn!(count = out.len(), topic, "reclaimed stale pending entries");
        }
        Ok(out)
    }

    /// Appends an already-serialized envelope body under `event` without
    /// going through [`Envelope`] serialization. Used by the outbox relay,
    /// which stores the envelope JSON it was handed at write time and must
    /// replay it byte-for-byte rather than re-encode a typed value.
    #[instrument(skip(self, data))]
    pub async fn publish_raw(&self, topic: &str, event: &str, data: &str) -> Result<String> {
        let key = stream_key(topic);
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(&key, "*", &[("event", event), ("data", data)]).await?;
        metrics::counter!("events_published_total", "event_type" => event.to_string(), "source" => "outbox").increment(1);
        Ok(id)
    }

    /// Smallest ID across every pending-entries-list of `topic`'s registered
    /// `groups`, or the stream's current last ID if no group has anything
    /// pending. This is the `safe_min_id` a trim must never go past
    /// (invariant 7): a group with nothing pending contributes no lower
    /// bound, but a group that has never been read from still holds "0" as
    /// its cursor and must block the trim entirely.
    #[instrument(skip(self))]
    pub async fn min_pending_id(&self, topic: &str, groups: &[&str]) -> Result<Option<String>> {
        let key = stream_key(topic);
        let mut conn = self.conn.clone();
        let mut min_id: Option<String> = None;
        for group in groups {
            let pending: redis::streams::StreamPendingReply = conn.xpending(&key, group).await?;
            let lowest = match pending {
                redis::streams::StreamPendingReply::Data(data) => data.start,
                redis::streams::StreamPendingReply::Empty => continue,
            };
            min_id = Some(match min_id {
                Some(current) if stream_id_cmp(&current, &lowest) != std::cmp::Ordering::Greater => current,
                _ => lowest,
            });
        }
        Ok(min_id)
    }

    /// Approximate trim to `safe_min_id`. Callers must compute `safe_min_id`
    /// as the minimum pending ID across all consumer groups of `topic`; an
    /// unchecked trim would lose undelivered work (invariant 7).
    pub async fn trim(&self, topic: &str, safe_min_id: &str) -> Result<()> {
        let key = stream_key(topic);
        let mut conn = self.conn.clone();
        let _: i64 = conn.xtrim(&key, redis::streams::StreamTrimOptions::minid(
            redis::streams::StreamTrimStrategy::Exact,
            safe_min_id,
        )).await?;
        Ok(())
    }

    /// Publishes into the topic's DLQ with a classification reason and
    /// structured detail, then the caller acks the original message.
    #[instrument(skip(self, payload, details))]
    pub async fn dead_letter(
        &self,
        topic: &str,
        payload: &str,
        reason: &str,
        details: &serde_json::Value,
    ) -> Result<String> {
        let key = dlq_key(topic);
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(
                &key,
                "*",
                &[
                    ("event", format!("{topic}.dlq").as_str()),
                    ("payload", payload),
                    ("reason", reason),
                    ("details", &details.to_string()),
                ],
            )
            .await?;
        metrics::counter!("events_failed_total", "event_type" => topic.to_string(), "consumer" => "dlq", "error_type" => reason.to_string()).increment(1);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_and_dlq_keys_are_namespaced() {
        assert_eq!(stream_key("posts.parsed"), "stream:posts.parsed");
        assert_eq!(dlq_key("posts.parsed"), "stream:posts.parsed:dlq");
    }

    #[test]
    fn stream_id_cmp_is_numeric_not_lexicographic() {
        use std::cmp::Ordering;
        assert_eq!(stream_id_cmp("9-0", "10-0"), Ordering::Less);
        assert_eq!(stream_id_cmp("1700000000000-5", "1700000000000-3"), Ordering::Greater);
        assert_eq!(stream_id_cmp("5-0", "5-0"), Ordering::Equal);
    }
}
