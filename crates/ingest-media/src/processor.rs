use std::sync::Arc;

use async_trait::async_trait;
use ingest_core::config::MediaConfig;
use ingest_eventbus::EventLogClient;
use ingest_events::{Base, Envelope, MediaFileRef, VisionUploaded};
use ingest_objectstore::keys::media_key;
use ingest_objectstore::{check_quota, ContentType, ObjectStore, QuotaLimits, UsageSnapshot};
use ingest_telegram::{MediaSink, PlatformClient, RawMediaRef};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{MediaError, Result};
use crate::mime::{extension_for, is_vision_eligible};

/// Downloads each attachment via the owning identity's [`PlatformClient`],
/// enforces the per-object size limit while streaming, checks quota, and
/// uploads into the content-addressed store. Implements
/// [`ingest_telegram::MediaSink`] so the ingestion worker never knows about
/// the object store or quota policy directly.
pub struct TelegramMediaProcessor {
    pub client: Arc<dyn PlatformClient>,
    pub store: Arc<ObjectStore>,
    pub limits: QuotaLimits,
    pub media_config: MediaConfig,
    pub event_log: EventLogClient,
}

impl TelegramMediaProcessor {
    #[instrument(skip(self, media))]
    async fn process_one(&self, tenant_id: &str, media: &RawMediaRef, usage: UsageSnapshot) -> Result<MediaFileRef> {
        let content_type = ContentType::Media;
        let declared_size = media.size_bytes.unwrap_or(0);
        let limit_bytes = (self.media_config.max_bytes_photo).max(self.media_config.max_bytes_doc);
        if declared_size > limit_bytes {
            return Err(MediaError::TooLarge { size_bytes: declared_size, limit_bytes });
        }

        let decision = check_quota(usage, &self.limits, declared_size, content_type);
        if !decision.allowed {
            return Err(MediaError::QuotaDenied(decision.reason.unwrap_or_default()));
        }

        let bytes = self.client.download_media(media).await?;
        if bytes.len() as u64 > limit_bytes {
            return Err(MediaError::TooLarge { size_bytes: bytes.len() as u64, limit_bytes });
        }

        let sha256 = ObjectStore::sha256_of(&bytes);
        let ext = extension_for(&media.mime_type);
        let key = media_key(tenant_id, &sha256, ext);
        let put = self.store.put(&key, bytes).await?;

        Ok(MediaFileRef {
            sha256,
            s3_key: put.key,
            mime_type: media.mime_type.clone(),
            size_bytes: put.size,
        })
    }
}

#[async_trait]
impl MediaSink for TelegramMediaProcessor {
    /// Downloads and stores every attachment, then publishes
    /// `posts.vision.uploaded` when at least one is vision-eligible.
    /// Per-object failures are logged and skipped rather than aborting the
    /// whole post's media (quota/size denials are expected, recoverable
    /// outcomes, not exceptions).
    #[instrument(skip(self, media))]
    async fn dispatch(&self, tenant_id: &str, post_id: Uuid, media: Vec<RawMediaRef>) -> Vec<String> {
        let usage = UsageSnapshot::default();
        let mut refs = Vec::with_capacity(media.len());
        for item in &media {
            match self.process_one(tenant_id, item, usage).await {
                Ok(file_ref) => refs.push(file_ref),
                Err(e) => warn!(error = %e, post_id = %post_id, "media attachment skipped"),
            }
        }

        let shas = refs.iter().map(|r| r.sha256.clone()).collect();
        let requires_vision = refs.iter().any(|r| is_vision_eligible(&r.mime_type));
        if !refs.is_empty() {
            if let Err(e) = self.publish_uploaded(tenant_id, post_id, refs, requires_vision).await {
                warn!(error = %e, post_id = %post_id, "failed to publish posts.vision.uploaded");
            }
        }
        shas
    }
}

impl TelegramMediaProcessor {
    async fn publish_uploaded(
        &self,
        tenant_id: &str,
        post_id: Uuid,
        media_files: Vec<MediaFileRef>,
        requires_vision: bool,
    ) -> Result<()> {
        let base = Base::new(format!("posts.vision.uploaded:{post_id}"))?;
        let envelope = Envelope::VisionUploaded(VisionUploaded {
            base,
            tenant_id: tenant_id.to_string(),
            post_id: post_id.to_string(),
            media_files,
            requires_vision,
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(())
    }
}
