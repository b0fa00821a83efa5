use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub platform_id: i64,
    pub encrypted_session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&Row> for Identity {
    type Error = tokio_postgres::Error;
    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            platform_id: row.try_get("platform_id")?,
            encrypted_session: row.try_get("encrypted_session")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub tenant_id: String,
    pub identity_id: Uuid,
    pub service_tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub platform_channel_id: i64,
    pub tenant_id: String,
    pub title: Option<String>,
    pub high_water_mark: i64,
    pub is_active: bool,
    pub on_hold: bool,
}

impl TryFrom<&Row> for Channel {
    type Error = tokio_postgres::Error;
    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            platform_channel_id: row.try_get("platform_channel_id")?,
            tenant_id: row.try_get("tenant_id")?,
            title: row.try_get("title")?,
            high_water_mark: row.try_get("high_water_mark")?,
            is_active: row.try_get("is_active")?,
            on_hold: row.try_get("on_hold")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub channel_id: Uuid,
    pub is_active: bool,
}

/// One observed message, as handed to the atomic batch writer by C6. Mirrors
/// spec §3's Post entity; counters merge via GREATEST, text via
/// COALESCE(NULLIF(...)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub tenant_id: String,
    pub platform_message_id: i64,
    pub text: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub has_media: bool,
    pub is_forward: bool,
    pub is_reply: bool,
    pub views: i64,
    pub reactions: i64,
    pub forwards: i64,
    pub replies: i64,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Result of writing one post row: its id, whether it was a genuinely new
/// insert (`xmax = 0`, spec §9 open question 2), or an update to an existing
/// row.
#[derive(Debug, Clone)]
pub struct WrittenPost {
    pub id: Uuid,
    pub platform_message_id: i64,
    pub inserted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaObject {
    pub sha256: String,
    pub mime: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub refs_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMediaMap {
    pub post_id: Uuid,
    pub sha256: String,
    pub position: i32,
    pub role: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Tags,
    Vision,
    Crawl,
}

impl EnrichmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrichmentKind::Tags => "tags",
            EnrichmentKind::Vision => "vision",
            EnrichmentKind::Crawl => "crawl",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEnrichment {
    pub post_id: Uuid,
    pub kind: EnrichmentKind,
    pub payload: serde_json::Value,
    pub version: String,
    /// Free-form per-kind sidecar. C13 stores `tags_version`/`features_hash`
    /// here on the `tags` row so it can tell a legacy (pre-vision) tagging
    /// pass from one that already accounted for a given vision result.
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexingPhaseStatus {
    Pending,
    Processing,
    Completed,
    Skipped,
    Failed,
}

impl IndexingPhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexingPhaseStatus::Pending => "pending",
            IndexingPhaseStatus::Processing => "processing",
            IndexingPhaseStatus::Completed => "completed",
            IndexingPhaseStatus::Skipped => "skipped",
            IndexingPhaseStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub post_id: Uuid,
    pub embedding_status: IndexingPhaseStatus,
    pub graph_status: IndexingPhaseStatus,
    pub vector_id: Option<String>,
    pub error_message: Option<String>,
    pub processing_completed_at: Option<DateTime<Utc>>,
}

/// A post together with its channel and enrichment rows, loaded in one
/// join so C12 never needs a second round-trip per post.
#[derive(Debug, Clone)]
pub struct PostForIndexing {
    pub id: Uuid,
    pub tenant_id: String,
    pub channel_id: Uuid,
    pub channel_tenant_id: String,
    pub channel_title: Option<String>,
    pub text: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub is_processed: bool,
    pub tags_payload: Option<serde_json::Value>,
    pub vision_payload: Option<serde_json::Value>,
    pub crawl_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub platform_grouped_id: i64,
    pub items_count: i32,
    pub cover_media_sha256: Option<String>,
    pub caption: Option<String>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumItem {
    pub album_id: Uuid,
    pub post_id: Uuid,
    pub position: i32,
}
