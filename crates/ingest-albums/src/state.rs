use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const STATE_TTL_SECS: u64 = 6 * 3600;

fn state_key(album_id: &str) -> String {
    format!("album:state:{album_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedItem {
    pub post_id: String,
    pub labels: Vec<String>,
    pub ocr_text: Option<String>,
    pub is_meme: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumState {
    pub album_id: String,
    pub tenant_id: String,
    pub channel_id: String,
    pub items_count: u32,
    pub items_analyzed: Vec<AnalyzedItem>,
    pub first_analyzed_at: Option<DateTime<Utc>>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

impl AlbumState {
    pub fn seed(album_id: String, tenant_id: String, channel_id: String, items_count: u32) -> Self {
        Self {
            album_id,
            tenant_id,
            channel_id,
            items_count,
            items_analyzed: Vec::new(),
            first_analyzed_at: None,
            last_analyzed_at: None,
        }
    }

    pub fn add_item(&mut self, item: AnalyzedItem, now: DateTime<Utc>) {
        if self.items_analyzed.iter().any(|i| i.post_id == item.post_id) {
            return;
        }
        self.items_analyzed.push(item);
        if self.first_analyzed_at.is_none() {
            self.first_analyzed_at = Some(now);
        }
        self.last_analyzed_at = Some(now);
    }

    pub fn is_complete(&self) -> bool {
        self.items_analyzed.len() as u32 >= self.items_count
    }

    pub fn assembly_lag_seconds(&self) -> i64 {
        match (self.first_analyzed_at, self.last_analyzed_at) {
            (Some(first), Some(last)) => (last - first).num_seconds(),
            _ => 0,
        }
    }
}

pub async fn load(conn: &ConnectionManager, album_id: &str) -> Result<Option<AlbumState>> {
    let mut conn = conn.clone();
    let raw: Option<String> = conn.get(state_key(album_id)).await?;
    Ok(raw.and_then(|r| serde_json::from_str(&r).ok()))
}

pub async fn save(conn: &ConnectionManager, state: &AlbumState) -> Result<()> {
    let mut conn = conn.clone();
    let raw = serde_json::to_string(state).unwrap_or_default();
    let _: () = conn.set_ex(state_key(&state.album_id), raw, STATE_TTL_SECS).await?;
    Ok(())
}

pub async fn delete(conn: &ConnectionManager, album_id: &str) -> Result<()> {
    let mut conn = conn.clone();
    let _: () = conn.del(state_key(album_id)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(post_id: &str) -> AnalyzedItem {
        AnalyzedItem { post_id: post_id.to_string(), labels: vec!["a".to_string()], ocr_text: None, is_meme: false }
    }

    #[test]
    fn add_item_is_idempotent_per_post() {
        let mut state = AlbumState::seed("alb1".to_string(), "t1".to_string(), "c1".to_string(), 3);
        let now = Utc.timestamp_opt(100, 0).unwrap();
        state.add_item(item("p1"), now);
        state.add_item(item("p1"), now);
        assert_eq!(state.items_analyzed.len(), 1);
    }

    #[test]
    fn complete_once_items_analyzed_reaches_items_count() {
        let mut state = AlbumState::seed("alb1".to_string(), "t1".to_string(), "c1".to_string(), 2);
        assert!(!state.is_complete());
        state.add_item(item("p1"), Utc.timestamp_opt(100, 0).unwrap());
        assert!(!state.is_complete());
        state.add_item(item("p2"), Utc.timestamp_opt(200, 0).unwrap());
        assert!(state.is_complete());
    }

    #[test]
    fn assembly_lag_is_difference_between_first_and_last() {
        let mut state = AlbumState::seed("alb1".to_string(), "t1".to_string(), "c1".to_string(), 2);
        state.add_item(item("p1"), Utc.timestamp_opt(100, 0).unwrap());
        state.add_item(item("p2"), Utc.timestamp_opt(340, 0).unwrap());
        assert_eq!(state.assembly_lag_seconds(), 240);
    }
}
