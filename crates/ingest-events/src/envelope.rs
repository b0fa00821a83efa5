use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EventError, Result};

/// Fields shared by every event, regardless of topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub trace_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub idempotency_key: String,
}

fn default_schema_version() -> String {
    "v1".to_string()
}

impl Base {
    /// New base with a fresh trace id and current timestamp.
    pub fn new(idempotency_key: impl Into<String>) -> Result<Self> {
        let idempotency_key = idempotency_key.into();
        if idempotency_key.is_empty() {
            return Err(EventError::EmptyIdempotencyKey);
        }
        Ok(Self {
            schema_version: default_schema_version(),
            trace_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            idempotency_key,
        })
    }

    /// Propagate an existing trace id across stages instead of minting a new one.
    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }
}

/// Tagged-union envelope: one variant per topic, replacing the source's
/// untyped dict payloads. `#[serde(tag = "event", content = "data")]` matches
/// the two-field wire shape the log client expects (`event`, `data`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Envelope {
    #[serde(rename = "posts.parsed")]
    PostsParsed(PostsParsed),
    #[serde(rename = "posts.tagged")]
    PostsTagged(PostsTagged),
    #[serde(rename = "posts.enriched")]
    PostsEnriched(PostsEnriched),
    #[serde(rename = "posts.indexed")]
    PostsIndexed(PostsIndexed),
    #[serde(rename = "posts.vision.uploaded")]
    VisionUploaded(VisionUploaded),
    #[serde(rename = "posts.vision.analyzed")]
    VisionAnalyzed(VisionAnalyzed),
    #[serde(rename = "posts.vision.skipped")]
    VisionSkipped(VisionSkipped),
    #[serde(rename = "albums.parsed")]
    AlbumsParsed(AlbumsParsed),
    #[serde(rename = "album.assembled")]
    AlbumAssembled(AlbumAssembled),
}

impl Envelope {
    /// Stage-local tenant id used for routing and dead-lettering. Every
    /// variant must resolve one; see `ingest_core::tenant::is_resolved`.
    pub fn tenant_id(&self) -> &str {
        match self {
            Envelope::PostsParsed(e) => &e.tenant_id,
            Envelope::PostsTagged(e) => &e.tenant_id,
            Envelope::PostsEnriched(e) => &e.tenant_id,
            Envelope::PostsIndexed(e) => &e.tenant_id,
            Envelope::VisionUploaded(e) => &e.tenant_id,
            Envelope::VisionAnalyzed(e) => &e.tenant_id,
            Envelope::VisionSkipped(e) => &e.tenant_id,
            Envelope::AlbumsParsed(e) => &e.tenant_id,
            Envelope::AlbumAssembled(e) => &e.tenant_id,
        }
    }

    /// Topic string used for log routing (`posts.parsed`, ...).
    pub fn topic(&self) -> &'static str {
        match self {
            Envelope::PostsParsed(_) => "posts.parsed",
            Envelope::PostsTagged(_) => "posts.tagged",
            Envelope::PostsEnriched(_) => "posts.enriched",
            Envelope::PostsIndexed(_) => "posts.indexed",
            Envelope::VisionUploaded(_) => "posts.vision.uploaded",
            Envelope::VisionAnalyzed(_) => "posts.vision.analyzed",
            Envelope::VisionSkipped(_) => "posts.vision.skipped",
            Envelope::AlbumsParsed(_) => "albums.parsed",
            Envelope::AlbumAssembled(_) => "album.assembled",
        }
    }

    /// Validates the fail-closed tenant policy before a publish is allowed to
    /// leave the process (data model invariant 6).
    pub fn validate(&self) -> Result<()> {
        if !ingest_core::tenant::is_resolved(self.tenant_id()) {
            return Err(EventError::UnresolvedTenant(self.topic().to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsParsed {
    #[serde(flatten)]
    pub base: Base,
    pub user_id: String,
    pub channel_id: String,
    pub post_id: String,
    pub tenant_id: String,
    pub text: String,
    pub urls: Vec<String>,
    pub posted_at: DateTime<Utc>,
    pub content_hash: String,
    pub link_count: u32,
    pub media_sha256_list: Vec<String>,
    pub platform_message_id: i64,
    pub platform_channel_id: i64,
    pub is_forward: bool,
    pub is_reply: bool,
    pub has_media: bool,
    /// `vision_retag` marks a re-parse carried over from C13 so C8 can
    /// apply its anti-loop guard; ordinary ingestion always sets `initial`.
    #[serde(default)]
    pub trigger: TaggingTrigger,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaggingTrigger {
    #[default]
    Initial,
    VisionRetag,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsTagged {
    #[serde(flatten)]
    pub base: Base,
    pub post_id: String,
    pub tenant_id: String,
    pub channel_id: String,
    pub tags: Vec<String>,
    pub tags_hash: String,
    pub topics: Vec<String>,
    pub provider: String,
    pub latency_ms: u64,
    pub trigger: TaggingTrigger,
    pub vision_version: Option<String>,
    /// Carried over from the triggering `posts.parsed` event so the
    /// enrichment stage can find a crawl target without re-reading the post.
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsEnriched {
    #[serde(flatten)]
    pub base: Base,
    pub post_id: String,
    pub tenant_id: String,
    pub enrichment: serde_json::Value,
    pub source_urls: Vec<String>,
    pub word_count: u32,
    pub original_word_count: u32,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub crawl_duration_ms: u64,
    pub policy_applied: String,
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsIndexed {
    #[serde(flatten)]
    pub base: Base,
    pub post_id: String,
    pub tenant_id: String,
    pub vector_id: Option<String>,
    pub embedding_provider: Option<String>,
    pub embedding_dim: Option<u32>,
    pub qdrant_collection: Option<String>,
    pub graph_nodes_written: u32,
    pub graph_relationships_written: u32,
    pub embedding_duration_ms: u64,
    pub graph_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFileRef {
    pub sha256: String,
    pub s3_key: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionUploaded {
    #[serde(flatten)]
    pub base: Base,
    pub tenant_id: String,
    pub post_id: String,
    pub media_files: Vec<MediaFileRef>,
    pub requires_vision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionResult {
    pub classification: String,
    pub description: String,
    pub labels: Vec<String>,
    pub objects: Vec<String>,
    pub is_meme: bool,
    pub ocr_text: Option<String>,
    pub nsfw_score: Option<f64>,
    pub aesthetic_score: Option<f64>,
    pub dominant_colors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionAnalyzed {
    #[serde(flatten)]
    pub base: Base,
    pub tenant_id: String,
    pub post_id: String,
    pub media: Vec<MediaFileRef>,
    pub vision: VisionResult,
    pub analysis_duration_ms: u64,
    pub vision_version: Option<String>,
    pub features_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionSkipped {
    #[serde(flatten)]
    pub base: Base,
    pub tenant_id: String,
    pub post_id: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumsParsed {
    #[serde(flatten)]
    pub base: Base,
    pub tenant_id: String,
    pub album_id: String,
    pub channel_id: String,
    pub items_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumAssembled {
    #[serde(flatten)]
    pub base: Base,
    pub tenant_id: String,
    pub album_id: String,
    pub items_analyzed: u32,
    pub labels: Vec<String>,
    pub has_meme: bool,
    pub has_text: bool,
    pub s3_key: String,
    pub assembly_lag_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_idempotency_key() {
        assert!(Base::new("").is_err());
        assert!(Base::new("k1").is_ok());
    }

    #[test]
    fn validate_rejects_unresolved_tenant() {
        let base = Base::new("k1").unwrap();
        let env = Envelope::AlbumsParsed(AlbumsParsed {
            base,
            tenant_id: "default".to_string(),
            album_id: "a1".to_string(),
            channel_id: "c1".to_string(),
            items_count: 3,
        });
        assert!(env.validate().is_err());
    }

    #[test]
    fn topic_roundtrips_through_json() {
        let base = Base::new("k1").unwrap();
        let env = Envelope::AlbumsParsed(AlbumsParsed {
            base,
            tenant_id: "t1".to_string(),
            album_id: "a1".to_string(),
            channel_id: "c1".to_string(),
            items_count: 3,
        });
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic(), "albums.parsed");
    }
}
