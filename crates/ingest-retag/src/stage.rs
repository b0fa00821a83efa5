use std::sync::Arc;

use deadpool_postgres::Pool;
use ingest_db::types::EnrichmentKind;
use ingest_events::{tags_hash, Base, Envelope, PostsTagged, TaggingTrigger};
use ingest_eventbus::{Delivery, EventLogClient};
use ingest_tagging::{normalize_tags, AiTaggingAdapter, TaggingContext};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::trigger::{parse_metadata, should_retag, TagsMetadata};

const GROUP: &str = "ingest-retag";

pub struct RetagStage {
    pub event_log: EventLogClient,
    pub adapter: Arc<dyn AiTaggingAdapter>,
    pub pool: Pool,
}

impl RetagStage {
    #[instrument(skip(self, delivery))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<bool> {
        let Envelope::VisionAnalyzed(analyzed) = &delivery.envelope else {
            return Ok(true);
        };

        let post_id: Uuid = match analyzed.post_id.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(post_id = %analyzed.post_id, "malformed post_id, dropping");
                return Ok(true);
            }
        };

        let existing = ingest_db::fetch_enrichment(&self.pool, post_id, EnrichmentKind::Tags).await?;
        let stored_metadata = existing
            .as_ref()
            .map(|row| parse_metadata(&row.metadata))
            .unwrap_or_default();

        if !should_retag(&stored_metadata, analyzed.vision_version.as_deref(), &analyzed.features_hash) {
            info!(post_id = %analyzed.post_id, "tags already account for this vision result, skipping retag");
            return Ok(true);
        }

        let Some(text) = fetch_post_text(&self.pool, post_id).await? else {
            warn!(post_id = %analyzed.post_id, "post vanished before retag, dropping");
            return Ok(true);
        };

        let context = TaggingContext {
            facets: vision_facets(analyzed),
        };
        let outcome = self.adapter.tag(&text, &context).await?;

        let tags = normalize_tags(outcome.tags.clone());
        let new_hash = tags_hash(&tags);

        let payload = serde_json::json!({
            "tags": tags,
            "topics": outcome.topics,
            "provider": outcome.provider,
        });
        let metadata = serde_json::to_value(TagsMetadata {
            vision_version: analyzed.vision_version.clone(),
            features_hash: Some(analyzed.features_hash.clone()),
        })
        .unwrap_or(serde_json::Value::Null);

        ingest_db::upsert_enrichment_with_metadata(&self.pool, post_id, EnrichmentKind::Tags, payload, &new_hash, metadata)
            .await?;

        let retag_context = ingest_db::fetch_post_retag_context(&self.pool, post_id).await?;
        let channel_id = retag_context
            .map(|c| c.platform_channel_id.to_string())
            .unwrap_or_default();

        let base = Base::new(format!("posts.tagged:retag:{}:{}", analyzed.post_id, new_hash))?;
        let envelope = Envelope::PostsTagged(PostsTagged {
            base,
            post_id: analyzed.post_id.clone(),
            tenant_id: analyzed.tenant_id.clone(),
            channel_id,
            tags,
            tags_hash: new_hash,
            topics: outcome.topics,
            provider: outcome.provider,
            latency_ms: outcome.latency_ms,
            trigger: TaggingTrigger::VisionRetag,
            vision_version: analyzed.vision_version.clone(),
            urls: Vec::new(),
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    pub async fn ensure_group(&self) -> Result<()> {
        self.event_log.ensure_group("posts.vision.analyzed", GROUP).await?;
        Ok(())
    }
}

/// Extra context handed to the tagging adapter on a retag pass: the vision
/// description and, when present, OCR'd text — spec §4.13's "passes the
/// vision description/OCR as additional context."
fn vision_facets(analyzed: &ingest_events::VisionAnalyzed) -> Vec<String> {
    let mut facets = vec![analyzed.vision.description.clone()];
    if let Some(ocr) = &analyzed.vision.ocr_text {
        facets.push(ocr.clone());
    }
    facets.extend(analyzed.vision.labels.clone());
    facets
}

async fn fetch_post_text(pool: &Pool, post_id: Uuid) -> Result<Option<String>> {
    Ok(ingest_db::fetch_post_retag_context(pool, post_id)
        .await?
        .and_then(|ctx| ctx.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_events::{Base, MediaFileRef, VisionAnalyzed, VisionResult};

    fn analyzed_event(vision_version: Option<&str>, features_hash: &str) -> VisionAnalyzed {
        VisionAnalyzed {
            base: Base::new("k1").unwrap(),
            tenant_id: "t1".to_string(),
            post_id: "p1".to_string(),
            media: Vec::<MediaFileRef>::new(),
            vision: VisionResult {
                classification: "photo".to_string(),
                description: "a cat sitting on a windowsill".to_string(),
                labels: vec!["cat".to_string()],
                objects: Vec::new(),
                is_meme: false,
                ocr_text: Some("store hours 9-5".to_string()),
                nsfw_score: None,
                aesthetic_score: None,
                dominant_colors: Vec::new(),
            },
            analysis_duration_ms: 10,
            vision_version: vision_version.map(str::to_string),
            features_hash: features_hash.to_string(),
        }
    }

    #[test]
    fn vision_facets_include_description_ocr_and_labels() {
        let event = analyzed_event(Some("v2"), "abc");
        let facets = vision_facets(&event);
        assert_eq!(facets[0], "a cat sitting on a windowsill");
        assert!(facets.contains(&"store hours 9-5".to_string()));
        assert!(facets.contains(&"cat".to_string()));
    }
}
