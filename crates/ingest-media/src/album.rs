use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ingest_telegram::RawMessage;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

const NEGATIVE_CACHE_TTL_SECS: u64 = 6 * 3600;

fn negative_cache_key(platform_channel_id: i64, grouped_id: i64) -> String {
    format!("album:seen:{platform_channel_id}:{grouped_id}")
}

/// Tracks `grouped_id`s already assembled into an album, so a sibling
/// arriving on a later poll cycle does not re-trigger `albums.parsed`.
pub struct AlbumNegativeCache {
    conn: ConnectionManager,
}

impl AlbumNegativeCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn has_seen(&self, platform_channel_id: i64, grouped_id: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(negative_cache_key(platform_channel_id, grouped_id)).await?;
        Ok(exists)
    }

    pub async fn mark_seen(&self, platform_channel_id: i64, grouped_id: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(negative_cache_key(platform_channel_id, grouped_id), "1", NEGATIVE_CACHE_TTL_SECS)
            .await?;
        Ok(())
    }
}

/// One detected album: the messages sharing a `grouped_id`, within the
/// configured time window, capped at `limit` siblings.
#[derive(Debug, Clone)]
pub struct AlbumGroup {
    pub grouped_id: i64,
    pub platform_channel_id: i64,
    pub members: Vec<RawMessage>,
}

/// Groups `messages` by `grouped_id`, keeping only members posted within
/// `window_minutes` of the group's earliest member and capping each group at
/// `limit` siblings (spec §4.7's album-window search).
pub fn group_albums(messages: &[RawMessage], window_minutes: i64, limit: usize) -> Vec<AlbumGroup> {
    use std::collections::HashMap;

    let mut buckets: HashMap<(i64, i64), Vec<RawMessage>> = HashMap::new();
    for msg in messages {
        if let Some(grouped_id) = msg.grouped_id {
            buckets
                .entry((msg.platform_channel_id, grouped_id))
                .or_default()
                .push(msg.clone());
        }
    }

    let window = ChronoDuration::minutes(window_minutes);
    buckets
        .into_iter()
        .map(|((platform_channel_id, grouped_id), mut members)| {
            members.sort_by_key(|m| m.posted_at);
            let anchor: DateTime<Utc> = members[0].posted_at;
            members.retain(|m| (m.posted_at - anchor).abs() <= window);
            members.truncate(limit);
            AlbumGroup { grouped_id, platform_channel_id, members }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ingest_telegram::RawMessage;

    fn msg(channel: i64, grouped: Option<i64>, minute: i64) -> RawMessage {
        RawMessage {
            platform_message_id: minute,
            platform_channel_id: channel,
            grouped_id: grouped,
            text: String::new(),
            posted_at: Utc.timestamp_opt(minute * 60, 0).unwrap(),
            media: Vec::new(),
            is_forward: false,
            is_reply: false,
            views: 0,
            reactions: 0,
            forwards: 0,
            replies: 0,
            is_edited: false,
            edited_at: None,
        }
    }

    #[test]
    fn groups_by_channel_and_grouped_id_within_window() {
        let messages = vec![msg(1, Some(99), 0), msg(1, Some(99), 1), msg(1, None, 2)];
        let groups = group_albums(&messages, 10, 10);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn excludes_siblings_outside_the_window() {
        let messages = vec![msg(1, Some(99), 0), msg(1, Some(99), 30)];
        let groups = group_albums(&messages, 10, 10);
        assert_eq!(groups[0].members.len(), 1);
    }

    #[test]
    fn caps_group_size_at_limit() {
        let messages: Vec<_> = (0..5).map(|i| msg(1, Some(99), i)).collect();
        let groups = group_albums(&messages, 60, 3);
        assert_eq!(groups[0].members.len(), 3);
    }
}
