use std::sync::Arc;

use deadpool_postgres::Pool;
use ingest_db::types::EnrichmentKind;
use ingest_eventbus::{Delivery, EventLogClient};
use ingest_events::{content_hash, tags_hash, Base, Envelope, PostsTagged, TaggingTrigger};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{normalize_tags, AiTaggingAdapter, TaggingContext};
use crate::cache::TaggingCache;
use crate::error::Result;

const GROUP: &str = "ingest-tagging";

pub struct TaggingStage {
    pub event_log: EventLogClient,
    pub adapter: Arc<dyn AiTaggingAdapter>,
    pub cache: TaggingCache,
    pub pool: Pool,
}

impl TaggingStage {
    /// Processes one `posts.parsed` delivery; returns `true` when the
    /// message should be acked (every outcome here is terminal — success,
    /// cache hit, anti-loop drop, or unchanged-hash no-op — none of them
    /// retry).
    #[instrument(skip(self, delivery))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<bool> {
        let Envelope::PostsParsed(parsed) = &delivery.envelope else {
            return Ok(true);
        };

        if parsed.trigger == TaggingTrigger::VisionRetag {
            info!(post_id = %parsed.post_id, "dropping vision_retag-triggered parse, C13 owns those");
            return Ok(true);
        }

        let post_id: Uuid = match parsed.post_id.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(post_id = %parsed.post_id, "malformed post_id, dropping");
                return Ok(true);
            }
        };

        let hash = content_hash(&parsed.text);
        let facets: Vec<String> = Vec::new();

        let outcome = match self.cache.get(&hash, &facets).await? {
            Some(cached) => cached,
            None => {
                let context = TaggingContext { facets: facets.clone() };
                let outcome = self.adapter.tag(&parsed.text, &context).await?;
                self.cache.put(&hash, &facets, &outcome).await?;
                outcome
            }
        };

        let tags = normalize_tags(outcome.tags.clone());
        let new_hash = tags_hash(&tags);

        let previous = ingest_db::fetch_enrichment(&self.pool, post_id, EnrichmentKind::Tags).await?;
        let changed = previous.as_ref().map(|p| p.version != new_hash).unwrap_or(true);

        let payload = serde_json::json!({
            "tags": tags,
            "topics": outcome.topics,
            "provider": outcome.provider,
        });
        ingest_db::upsert_enrichment(&self.pool, post_id, EnrichmentKind::Tags, payload, &new_hash).await?;

        if !changed {
            info!(post_id = %parsed.post_id, "tags unchanged, acking without publish");
            return Ok(true);
        }

        let base = Base::new(format!("posts.tagged:{}:{}", parsed.post_id, new_hash))?;
        let envelope = Envelope::PostsTagged(PostsTagged {
            base,
            post_id: parsed.post_id.clone(),
            tenant_id: parsed.tenant_id.clone(),
            channel_id: parsed.channel_id.clone(),
            tags,
            tags_hash: new_hash,
            topics: outcome.topics,
            provider: outcome.provider,
            latency_ms: outcome.latency_ms,
            trigger: TaggingTrigger::Initial,
            vision_version: None,
            urls: parsed.urls.clone(),
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    pub async fn ensure_group(&self) -> Result<()> {
        self.event_log.ensure_group("posts.parsed", GROUP).await?;
        Ok(())
    }
}
