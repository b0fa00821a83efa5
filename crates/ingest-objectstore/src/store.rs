use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::error::{ObjectStoreError, Result};
use crate::keys::ContentType;

/// Deterministic keying + idempotent upload over an S3-compatible bucket.
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub sha256: String,
    pub key: String,
    pub size: u64,
    /// False when the object already existed and the upload was skipped.
    pub newly_written: bool,
}

impl ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn sha256_of(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Uploads `bytes` under `key` iff it does not already exist. Repeated
    /// `put` of identical bytes is a no-op and returns the existing key
    /// (round-trip law: `put(b)` twice yields the same key).
    #[instrument(skip(self, bytes))]
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<PutResult> {
        let sha256 = Self::sha256_of(&bytes);
        let size = bytes.len() as u64;

        if self.exists(key).await? {
            debug!(key, "object already present, skipping upload");
            return Ok(PutResult {
                sha256,
                key: key.to_string(),
                size,
                newly_written: false,
            });
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .cache_control("no-store")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        metrics::counter!("objectstore_put_total", "status" => "written").increment(1);
        metrics::histogram!("objectstore_put_bytes").record(size as f64);

        Ok(PutResult {
            sha256,
            key: key.to_string(),
            size,
            newly_written: true,
        })
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let svc = e.as_service_error();
                if svc.map(|e| e.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(ObjectStoreError::Backend(e.to_string()))
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?
            .into_bytes();
        metrics::counter!("objectstore_get_total").increment(1);
        Ok(bytes.to_vec())
    }

    /// Logical deletion of the descriptor. A blob held by an in-flight read
    /// is not physically unlinked underneath it; the object-store layer owns
    /// that safety, this call only removes the addressable key.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// A candidate for eviction, independent of storage backend: the fields the
/// LRU policy (§4.3) needs to rank by.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub sha256: String,
    pub refs_count: i64,
    pub last_seen_at: DateTime<Utc>,
    pub content_type: ContentType,
}

/// Orders eviction candidates by priority `refs_count = 0` first, then
/// oldest `last_seen_at`, then content-type priority `crawl > vision >
/// media`. Only `refs_count = 0` rows are eligible at all.
pub fn rank_eviction_candidates(mut candidates: Vec<EvictionCandidate>) -> Vec<EvictionCandidate> {
    candidates.retain(|c| c.refs_count == 0);
    candidates.sort_by(|a, b| {
        a.last_seen_at
            .cmp(&b.last_seen_at)
            .then_with(|| a.content_type.eviction_priority().cmp(&b.content_type.eviction_priority()))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(sha: &str, refs: i64, seen: i64, ct: ContentType) -> EvictionCandidate {
        EvictionCandidate {
            sha256: sha.to_string(),
            refs_count: refs,
            last_seen_at: Utc.timestamp_opt(seen, 0).unwrap(),
            content_type: ct,
        }
    }

    #[test]
    fn only_unreferenced_candidates_are_eligible() {
        let candidates = vec![
            candidate("a", 1, 100, ContentType::Media),
            candidate("b", 0, 200, ContentType::Media),
        ];
        let ranked = rank_eviction_candidates(candidates);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].sha256, "b");
    }

    #[test]
    fn orders_by_oldest_then_content_type_priority() {
        let candidates = vec![
            candidate("media-old", 0, 100, ContentType::Media),
            candidate("crawl-old", 0, 100, ContentType::Crawl),
            candidate("vision-newer", 0, 200, ContentType::Vision),
        ];
        let ranked = rank_eviction_candidates(candidates);
        assert_eq!(ranked[0].sha256, "crawl-old");
        assert_eq!(ranked[1].sha256, "media-old");
        assert_eq!(ranked[2].sha256, "vision-newer");
    }
}
