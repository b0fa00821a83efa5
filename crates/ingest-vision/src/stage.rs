use std::sync::Arc;
use std::time::Instant;

use deadpool_postgres::Pool;
use ingest_core::config::VisionConfig;
use ingest_db::types::EnrichmentKind;
use ingest_events::{features_hash, Base, Envelope, MediaFileRef, VisionAnalyzed, VisionSkipped, VisionUploaded};
use ingest_eventbus::{Delivery, EventLogClient};
use ingest_objectstore::keys::vision_key;
use ingest_objectstore::ObjectStore;
use redis::aio::ConnectionManager;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::adapter::{OcrFallbackAdapter, VisionAdapter, VisionAdapterOutcome};
use crate::budget::BudgetGate;
use crate::error::{Result, VisionError};
use crate::idempotency;
use crate::policy::{self, PolicyDecision};
use crate::schema;
use crate::dlq;

const GROUP: &str = "ingest-vision";

pub struct VisionStage {
    pub event_log: EventLogClient,
    pub redis: ConnectionManager,
    pub pool: Pool,
    pub store: Arc<ObjectStore>,
    pub adapter: Arc<dyn VisionAdapter>,
    pub ocr_fallback: Option<Arc<dyn OcrFallbackAdapter>>,
    pub budget: BudgetGate,
    pub config: VisionConfig,
}

impl VisionStage {
    #[instrument(skip(self, delivery))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<bool> {
        let Envelope::VisionUploaded(uploaded) = &delivery.envelope else {
            return Ok(true);
        };

        let post_id: Uuid = match uploaded.post_id.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(post_id = %uploaded.post_id, "malformed post_id, dropping");
                return Ok(true);
            }
        };

        let eligible = match policy::evaluate(&uploaded.media_files, uploaded.requires_vision) {
            PolicyDecision::Allow(media) => media,
            PolicyDecision::Deny(reason) => return self.publish_skipped(uploaded, vec![reason.to_string()]).await,
        };

        let started = Instant::now();
        let mut analyzed: Vec<MediaFileRef> = Vec::new();
        let mut last_validated = None;
        let mut last_provider = String::new();

        for media in &eligible {
            if idempotency::already_processed(&self.redis, &self.pool, post_id, &uploaded.post_id, &media.sha256).await? {
                continue;
            }

            if !self.budget.try_reserve(&uploaded.tenant_id, self.config.estimated_tokens_per_image).await? {
                return self.publish_skipped(uploaded, vec!["budget_exhausted".to_string()]).await;
            }

            let bytes = self.store.get(&media.s3_key).await?;
            let outcome = match self.adapter.analyze(&bytes, &media.mime_type).await {
                Ok(o) => o,
                Err(VisionError::ProviderUnreachable(detail)) if self.config.allow_ocr_fallback => {
                    match self.run_ocr_fallback(&bytes).await {
                        Some(o) => o,
                        None => return self.handle_terminal_error(delivery, VisionError::ProviderUnreachable(detail)).await,
                    }
                }
                Err(e) => return self.handle_terminal_error(delivery, e).await,
            };

            let validated = match schema::normalize_and_validate(outcome.result) {
                Ok(v) => v,
                Err(e) => return self.handle_terminal_error(delivery, e).await,
            };

            let key = vision_key(&uploaded.tenant_id, &media.sha256, &outcome.provider, &outcome.model, "1", false);
            let payload = serde_json::to_value(&validated).unwrap_or(serde_json::Value::Null);
            self.store.put(&key, serde_json::to_vec(&payload).unwrap_or_default()).await?;
            ingest_db::upsert_enrichment(&self.pool, post_id, EnrichmentKind::Vision, payload, &media.sha256).await?;
            idempotency::mark_processed(&self.redis, &uploaded.post_id, &media.sha256, self.config.idempotency_ttl_h).await?;

            analyzed.push(media.clone());
            last_provider = outcome.provider;
            last_validated = Some(validated);
        }

        let Some(vision) = last_validated else {
            return self.publish_skipped(uploaded, vec!["idempotency".to_string()]).await;
        };

        let shas: Vec<String> = analyzed.iter().map(|m| m.sha256.clone()).collect();
        let mimes: Vec<String> = analyzed.iter().map(|m| m.mime_type.clone()).collect();
        let hash = features_hash(&shas, &mimes);

        let base = Base::new(format!("posts.vision.analyzed:{}:{}", uploaded.post_id, hash))?;
        let envelope = Envelope::VisionAnalyzed(VisionAnalyzed {
            base,
            tenant_id: uploaded.tenant_id.clone(),
            post_id: uploaded.post_id.clone(),
            media: analyzed,
            vision,
            analysis_duration_ms: started.elapsed().as_millis() as u64,
            vision_version: Some(last_provider),
            features_hash: hash,
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    async fn run_ocr_fallback(&self, bytes: &[u8]) -> Option<VisionAdapterOutcome> {
        let fallback = self.ocr_fallback.as_ref()?;
        let text = fallback.ocr(bytes).await.ok()?;
        Some(VisionAdapterOutcome {
            result: ingest_events::VisionResult {
                classification: "other".to_string(),
                description: if text.trim().is_empty() {
                    "ocr fallback: no legible text".to_string()
                } else {
                    text.clone()
                },
                labels: Vec::new(),
                objects: Vec::new(),
                is_meme: false,
                ocr_text: Some(text),
                nsfw_score: None,
                aesthetic_score: None,
                dominant_colors: Vec::new(),
            },
            provider: "ocr_fallback".to_string(),
            model: "ocr".to_string(),
            tokens_used: 0,
        })
    }

    /// Increments the per-message delivery counter; once it reaches
    /// `max_deliveries` the message is dead-lettered and acked. Below the
    /// threshold this returns `Ok(false)` (leave unacked for redelivery)
    /// rather than `Err` — `Adapter`/`SchemaInvalid` categorize as
    /// `ErrorCategory::Permanent`, and the generic runner dead-letters on
    /// the first `Err` of a permanent error, which would make the counter
    /// above pointless.
    async fn handle_terminal_error(&self, delivery: &Delivery, err: VisionError) -> Result<bool> {
        let count = dlq::record_delivery(&self.redis, &delivery.id).await?;
        if count >= self.config.max_deliveries {
            let payload = serde_json::to_string(&delivery.envelope).unwrap_or_default();
            self.event_log
                .dead_letter(
                    delivery.envelope.topic(),
                    &payload,
                    "vision_failed",
                    &serde_json::json!({ "error": err.to_string(), "deliveries": count }),
                )
                .await?;
            warn!(message_id = %delivery.id, error = %err, deliveries = count, "vision analysis exhausted retries, routed to DLQ");
            return Ok(true);
        }
        warn!(message_id = %delivery.id, error = %err, deliveries = count, "vision analysis failed, leaving pending for redelivery");
        Ok(false)
    }

    async fn publish_skipped(&self, uploaded: &VisionUploaded, reasons: Vec<String>) -> Result<bool> {
        let base = Base::new(format!("posts.vision.skipped:{}:{}", uploaded.post_id, reasons.join(",")))?;
        let envelope = Envelope::VisionSkipped(VisionSkipped {
            base,
            tenant_id: uploaded.tenant_id.clone(),
            post_id: uploaded.post_id.clone(),
            reasons,
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    pub async fn ensure_group(&self) -> Result<()> {
        self.event_log.ensure_group("posts.vision.uploaded", GROUP).await?;
        Ok(())
    }
}
