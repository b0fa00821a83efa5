use std::io::Read as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool_postgres::Pool;
use flate2::read::GzDecoder;
use ingest_core::config::{GraphConfig, IndexingConfig};
use ingest_db::types::{IndexingPhaseStatus, IndexingStatus, PostForIndexing};
use ingest_events::{Base, Envelope, PostsIndexed};
use ingest_eventbus::{Delivery, EventLogClient};
use ingest_objectstore::ObjectStore;
use neo4rs::Graph;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::embedding::{embed_text, EmbeddingAdapter};
use crate::error::{IndexingError, Result};
use crate::graph::{self, PostGraphInput};
use crate::payload::build_payload;
use crate::text::compose_embedding_text;
use crate::vector::VectorStore;

const GROUP: &str = "ingest-indexing";
const CRAWL_EXCERPT_CAP: usize = 1500;

pub struct IndexingStage {
    pub event_log: EventLogClient,
    pub pool: Pool,
    pub store: Arc<ObjectStore>,
    pub vector_store: Arc<VectorStore>,
    pub graph: Graph,
    pub embedding_adapter: Arc<dyn EmbeddingAdapter>,
    pub embedding_dim: u32,
    pub embedding_provider: String,
    pub graph_config: GraphConfig,
    pub config: IndexingConfig,
    pub semaphore: Arc<Semaphore>,
}

impl IndexingStage {
    #[instrument(skip(self, delivery))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<bool> {
        let Envelope::PostsEnriched(enriched) = &delivery.envelope else {
            return Ok(true);
        };

        let post_id: Uuid = match enriched.post_id.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(post_id = %enriched.post_id, "malformed post_id, dropping");
                return Ok(true);
            }
        };

        let _permit = self.semaphore.clone().acquire_owned().await.expect("semaphore never closed");

        let Some(post) = ingest_db::fetch_post_for_indexing(&self.pool, post_id).await? else {
            warn!(post_id = %enriched.post_id, "post vanished before indexing, dropping");
            return Ok(true);
        };

        let tenant_id = resolve_tenant(enriched.tenant_id.as_str(), &post)?;

        let embedding_started = Instant::now();
        let embedding_outcome = self.run_embedding_phase(&tenant_id, post_id, &post).await;
        let embedding_duration_ms = embedding_started.elapsed().as_millis() as u64;

        let (embedding_status, vector_id) = match embedding_outcome {
            Ok(EmbeddingPhaseResult::Completed(vector_id)) => (IndexingPhaseStatus::Completed, Some(vector_id)),
            Ok(EmbeddingPhaseResult::Skipped) => (IndexingPhaseStatus::Skipped, None),
            Err(e) if e.dlq_reason().is_some() => return self.dead_letter(delivery, e).await,
            Err(e) => return Err(e),
        };

        let graph_started = Instant::now();
        let graph_counts = self.write_graph(&tenant_id, post_id, &post).await?;
        let graph_duration_ms = graph_started.elapsed().as_millis() as u64;

        let status = IndexingStatus {
            post_id,
            embedding_status,
            graph_status: IndexingPhaseStatus::Completed,
            vector_id: vector_id.clone(),
            error_message: None,
            processing_completed_at: Some(chrono::Utc::now()),
        };
        ingest_db::upsert_indexing_status(&self.pool, &status).await?;
        ingest_db::mark_post_processed(&self.pool, post_id).await?;

        let base = Base::new(format!("posts.indexed:{}", enriched.post_id))?;
        let envelope = Envelope::PostsIndexed(PostsIndexed {
            base,
            post_id: enriched.post_id.clone(),
            tenant_id: tenant_id.clone(),
            vector_id,
            embedding_provider: Some(self.embedding_provider.clone()),
            embedding_dim: Some(self.embedding_dim),
            qdrant_collection: Some(VectorStore::collection_name(&tenant_id)),
            graph_nodes_written: graph_counts.nodes,
            graph_relationships_written: graph_counts.relationships,
            embedding_duration_ms,
            graph_duration_ms,
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    async fn run_embedding_phase(&self, tenant_id: &str, post_id: Uuid, post: &PostForIndexing) -> Result<EmbeddingPhaseResult> {
        let crawl_excerpt = self.fetch_crawl_excerpt(post).await;
        let Some(text) = compose_embedding_text(post, crawl_excerpt.as_deref()) else {
            return Ok(EmbeddingPhaseResult::Skipped);
        };

        let embedding = embed_text(self.embedding_adapter.as_ref(), &text, self.embedding_dim).await?;

        let tags: Vec<String> = post
            .tags_payload
            .as_ref()
            .and_then(|v| v.get("tags"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let topics: Vec<String> = post
            .tags_payload
            .as_ref()
            .and_then(|v| v.get("topics"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let album_id = ingest_db::fetch_album_id_for_post(&self.pool, post_id).await?;

        let collection = VectorStore::collection_name(tenant_id);
        self.vector_store.ensure_collection(&collection, self.embedding_dim as u64).await?;

        let payload = build_payload(post, tags, topics, album_id);
        let payload_json = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        self.vector_store
            .upsert(&collection, post_id, embedding.vector, payload_json)
            .await?;

        Ok(EmbeddingPhaseResult::Completed(post_id.to_string()))
    }

    /// Downloads and decompresses the crawl markdown blob (if any), capped
    /// for the embedding-text excerpt. Best-effort: a fetch failure here
    /// degrades to "no crawl excerpt" rather than failing the whole post.
    async fn fetch_crawl_excerpt(&self, post: &PostForIndexing) -> Option<String> {
        let key = post.crawl_payload.as_ref()?.get("s3_key")?.as_str()?;
        let bytes = self.store.get(key).await.ok()?;
        let mut decoder = GzDecoder::new(bytes.as_slice());
        let mut text = String::new();
        decoder.read_to_string(&mut text).ok()?;
        Some(text.chars().take(CRAWL_EXCERPT_CAP).collect())
    }

    async fn write_graph(&self, tenant_id: &str, post_id: Uuid, post: &PostForIndexing) -> Result<graph::GraphWriteCounts> {
        let tags: Vec<String> = post
            .tags_payload
            .as_ref()
            .and_then(|v| v.get("tags"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let topics: Vec<String> = post
            .tags_payload
            .as_ref()
            .and_then(|v| v.get("topics"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let media_shas: Vec<(String, Option<String>)> = ingest_db::fetch_post_media_shas(&self.pool, post_id)
            .await?
            .into_iter()
            .map(|m| (m.sha256, Some(m.mime)))
            .collect();

        let crawl_url = post
            .crawl_payload
            .as_ref()
            .and_then(|v| v.get("canonical_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let ocr_text = post
            .vision_payload
            .as_ref()
            .and_then(|v| v.get("ocr_text").or_else(|| v.get("text_enhanced")))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let ocr_entities = graph::extract_entities(ocr_text);

        let album_id = ingest_db::fetch_album_id_for_post(&self.pool, post_id).await?;

        let input = PostGraphInput {
            post_id,
            tenant_id,
            channel_id: post.channel_id,
            channel_title: post.channel_title.as_deref(),
            posted_at: post.posted_at,
            tags: &tags,
            topics: &topics,
            media_shas: &media_shas,
            crawl_url: crawl_url.as_deref(),
            ocr_entities: &ocr_entities,
            album_id,
            post_expires_days: self.graph_config.post_expires_days,
        };
        Ok(graph::write_post(&self.graph, &input).await?)
    }

    async fn dead_letter(&self, delivery: &Delivery, err: IndexingError) -> Result<bool> {
        let reason = err.dlq_reason().unwrap_or("unhandled");
        let payload = serde_json::to_string(&delivery.envelope).unwrap_or_default();
        self.event_log
            .dead_letter(
                delivery.envelope.topic(),
                &payload,
                reason,
                &serde_json::json!({ "error": err.to_string() }),
            )
            .await?;
        warn!(message_id = %delivery.id, reason, "indexing failed permanently, routed to DLQ");
        Ok(true)
    }

    pub async fn ensure_group(&self) -> Result<()> {
        self.event_log.ensure_group("posts.enriched", GROUP).await?;
        Ok(())
    }

    /// Trims `posts.enriched` to the minimum pending ID across every
    /// registered consumer group of that topic, per spec §4.12 (invariant
    /// 5 of the log). Callers invoke this between batches, not per message.
    pub async fn trim(&self, groups: &[&str]) -> Result<()> {
        if let Some(safe_min_id) = self.event_log.min_pending_id("posts.enriched", groups).await? {
            self.event_log.trim("posts.enriched", &safe_min_id).await?;
        }
        Ok(())
    }

    /// Reclaims PEL entries idle longer than `min_idle`, bounding lag after
    /// a crashed consumer.
    pub async fn reclaim(&self, consumer: &str, min_idle: Duration) -> Result<Vec<Delivery>> {
        Ok(self.event_log.reclaim("posts.enriched", GROUP, consumer, min_idle).await?)
    }
}

enum EmbeddingPhaseResult {
    Completed(String),
    Skipped,
}

/// Tenant resolution priority per spec §4.12: event field, then the
/// post/channel join already loaded, then fail-closed (permanent error —
/// an indexed event can never carry an unresolved tenant, invariant 6).
fn resolve_tenant(event_tenant_id: &str, post: &PostForIndexing) -> Result<String> {
    if ingest_core::tenant::is_resolved(event_tenant_id) {
        return Ok(event_tenant_id.to_string());
    }
    if ingest_core::tenant::is_resolved(&post.tenant_id) {
        return Ok(post.tenant_id.clone());
    }
    if ingest_core::tenant::is_resolved(&post.channel_tenant_id) {
        return Ok(post.channel_tenant_id.clone());
    }
    warn!(post_id = %post.id, "tenant unresolved through every fallback, failing closed");
    Err(IndexingError::Event(ingest_events::EventError::UnresolvedTenant("posts.indexed".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(tenant: &str, channel_tenant: &str) -> PostForIndexing {
        PostForIndexing {
            id: Uuid::nil(),
            tenant_id: tenant.to_string(),
            channel_id: Uuid::nil(),
            channel_tenant_id: channel_tenant.to_string(),
            channel_title: None,
            text: None,
            posted_at: Utc::now(),
            is_processed: false,
            tags_payload: None,
            vision_payload: None,
            crawl_payload: None,
        }
    }

    #[test]
    fn event_tenant_wins_when_resolved() {
        let p = post("t1", "t2");
        assert_eq!(resolve_tenant("t0", &p).unwrap(), "t0");
    }

    #[test]
    fn falls_back_to_post_then_channel_tenant() {
        let p = post("default", "t2");
        assert_eq!(resolve_tenant("default", &p).unwrap(), "t2");
    }

    #[test]
    fn fails_closed_when_nothing_resolves() {
        let p = post("default", "default");
        assert!(resolve_tenant("", &p).is_err());
    }
}
