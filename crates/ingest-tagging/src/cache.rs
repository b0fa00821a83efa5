use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};

use crate::adapter::TaggingOutcome;
use crate::error::Result;

const CACHE_TTL_SECS: u64 = 24 * 3600;

fn cache_key(content_hash: &str, facets: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    for facet in facets {
        hasher.update(b"|");
        hasher.update(facet.as_bytes());
    }
    format!("tagging:cache:{}", hex::encode(hasher.finalize()))
}

/// Short-circuits repeat tagging of identical text + facets. A hit skips the
/// AI adapter call entirely; a miss is filled after the adapter responds.
pub struct TaggingCache {
    conn: ConnectionManager,
}

impl TaggingCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn get(&self, content_hash: &str, facets: &[String]) -> Result<Option<TaggingOutcome>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(cache_key(content_hash, facets)).await?;
        Ok(raw.and_then(|r| serde_json::from_str::<CachedOutcome>(&r).ok()).map(Into::into))
    }

    pub async fn put(&self, content_hash: &str, facets: &[String], outcome: &TaggingOutcome) -> Result<()> {
        let cached = CachedOutcome::from(outcome);
        let raw = serde_json::to_string(&cached).unwrap_or_default();
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(cache_key(content_hash, facets), raw, CACHE_TTL_SECS).await?;
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedOutcome {
    tags: Vec<String>,
    topics: Vec<String>,
    provider: String,
    tokens_used: u32,
    latency_ms: u64,
}

impl From<&TaggingOutcome> for CachedOutcome {
    fn from(o: &TaggingOutcome) -> Self {
        Self {
            tags: o.tags.clone(),
            topics: o.topics.clone(),
            provider: o.provider.clone(),
            tokens_used: o.tokens_used,
            latency_ms: o.latency_ms,
        }
    }
}

impl From<CachedOutcome> for TaggingOutcome {
    fn from(c: CachedOutcome) -> Self {
        Self {
            tags: c.tags,
            topics: c.topics,
            provider: c.provider,
            tokens_used: c.tokens_used,
            latency_ms: c.latency_ms,
        }
    }
}
