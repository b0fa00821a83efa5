use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use ingest_db::types::PostForIndexing;

const PAYLOAD_BUDGET_BYTES: usize = 64 * 1024;
const TEXT_SHORT_CAP: usize = 500;

/// What gets attached to a Qdrant point alongside its vector. Kept separate
/// from the embedding text itself — the model never sees `tags`/`album_id`,
/// only the payload filters do.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPayload {
    pub post_id: String,
    pub tenant_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_title: Option<String>,
    pub text_short: String,
    pub posted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_vision: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_crawl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum StripStage {
    Tags,
    BooleanFacets,
    AlbumId,
}

/// Stripped in this order when the serialized payload still exceeds
/// [`PAYLOAD_BUDGET_BYTES`] after the previous stage. `post_id`/`tenant_id`/
/// `channel_id`/`text_short` are never stripped — payload-filtered search
/// and the per-tenant collection scoping both depend on them surviving.
const STRIP_ORDER: [StripStage; 3] = [StripStage::Tags, StripStage::BooleanFacets, StripStage::AlbumId];

pub fn build_payload(post: &PostForIndexing, tags: Vec<String>, topics: Vec<String>, album_id: Option<Uuid>) -> VectorPayload {
    let text_short: String = post.text.as_deref().unwrap_or_default().chars().take(TEXT_SHORT_CAP).collect();

    let mut payload = VectorPayload {
        post_id: post.id.to_string(),
        tenant_id: post.tenant_id.clone(),
        channel_id: post.channel_id.to_string(),
        channel_title: post.channel_title.clone(),
        text_short,
        posted_at: post.posted_at,
        tags,
        topics,
        has_vision: Some(post.vision_payload.is_some()),
        has_crawl: Some(post.crawl_payload.is_some()),
        album_id: album_id.map(|id| id.to_string()),
    };

    for stage in STRIP_ORDER {
        if serialized_size(&payload) <= PAYLOAD_BUDGET_BYTES {
            break;
        }
        strip(&mut payload, stage);
    }

    payload
}

fn serialized_size(payload: &VectorPayload) -> usize {
    serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(usize::MAX)
}

fn strip(payload: &mut VectorPayload, stage: StripStage) {
    match stage {
        StripStage::Tags => {
            payload.tags.clear();
            payload.topics.clear();
        }
        StripStage::BooleanFacets => {
            payload.has_vision = None;
            payload.has_crawl = None;
        }
        StripStage::AlbumId => {
            payload.album_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post_with_text(len: usize) -> PostForIndexing {
        PostForIndexing {
            id: Uuid::nil(),
            tenant_id: "t1".to_string(),
            channel_id: Uuid::nil(),
            channel_tenant_id: "t1".to_string(),
            channel_title: Some("Channel".to_string()),
            text: Some("x".repeat(len)),
            posted_at: Utc::now(),
            is_processed: false,
            tags_payload: None,
            vision_payload: None,
            crawl_payload: None,
        }
    }

    #[test]
    fn small_payload_keeps_every_facet() {
        let post = post_with_text(10);
        let payload = build_payload(&post, vec!["rust".into()], vec!["tech".into()], Some(Uuid::nil()));
        assert!(!payload.tags.is_empty());
        assert!(payload.has_vision.is_some());
        assert!(payload.album_id.is_some());
    }

    #[test]
    fn oversized_payload_strips_tags_then_facets_then_album_before_text() {
        let post = post_with_text(10);
        let huge_tags: Vec<String> = (0..200).map(|i| format!("tag-{i}-{}", "x".repeat(1000))).collect();
        let payload = build_payload(&post, huge_tags, vec!["topic".to_string()], Some(Uuid::nil()));
        assert!(payload.tags.is_empty());
        assert!(payload.topics.is_empty());
        assert!(payload.has_vision.is_none());
        assert!(payload.album_id.is_none());
        assert!(!payload.text_short.is_empty());
        assert_eq!(payload.post_id, post.id.to_string());
    }
}
