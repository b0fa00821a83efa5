use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use deadpool_postgres::Pool;
use flate2::write::GzEncoder;
use flate2::Compression;
use ingest_core::config::CrawlConfig;
use ingest_db::types::EnrichmentKind;
use ingest_eventbus::{Delivery, EventLogClient};
use ingest_events::{Base, Envelope, PostsEnriched};
use ingest_objectstore::keys::crawl_key;
use ingest_objectstore::ObjectStore;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::canonicalize::{canonicalize_url, hash_canonical_url};
use crate::crawler;
use crate::error::Result;
use crate::policy::{first_url, tags_match_crawl_policy};

const GROUP: &str = "ingest-enrichment";

pub struct EnrichmentStage {
    pub event_log: EventLogClient,
    pub http: reqwest::Client,
    pub store: Arc<ObjectStore>,
    pub pool: Pool,
    pub config: CrawlConfig,
    /// Caps the number of crawls in flight at once; acquisition failure is
    /// the `budget_exhausted` skip reason, not an error.
    pub budget: Arc<Semaphore>,
}

impl EnrichmentStage {
    #[instrument(skip(self, delivery))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<bool> {
        let Envelope::PostsTagged(tagged) = &delivery.envelope else {
            return Ok(true);
        };

        let post_id: Uuid = match tagged.post_id.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(post_id = %tagged.post_id, "malformed post_id, dropping");
                return Ok(true);
            }
        };

        if !tags_match_crawl_policy(&tagged.tags, &self.config.tag_patterns) {
            return self.publish_skipped(tagged, "tag_mismatch", 0).await;
        }

        let Some(url) = first_url(&tagged.urls) else {
            return self.publish_skipped(tagged, "no_url", 0).await;
        };

        let canonical = canonicalize_url(url, self.config.remove_trailing_slash);
        let url_hash = hash_canonical_url(&canonical);

        let previous = ingest_db::fetch_enrichment(&self.pool, post_id, EnrichmentKind::Crawl).await?;
        if previous.as_ref().map(|p| p.version == url_hash).unwrap_or(false) {
            return self.publish_skipped(tagged, "cache_hit", 0).await;
        }

        let Ok(_permit) = self.budget.clone().try_acquire_owned() else {
            return self.publish_skipped(tagged, "budget_exhausted", 0).await;
        };

        let started = Instant::now();
        let page = crawler::fetch(&self.http, &canonical, &self.config).await?;
        let crawl_duration_ms = started.elapsed().as_millis() as u64;

        let compressed = gzip(page.markdown.as_bytes());
        let key = crawl_key(&tagged.tenant_id, &url_hash, "md");
        self.store.put(&key, compressed).await?;

        let payload = serde_json::json!({
            "url": url,
            "canonical_url": canonical,
            "s3_key": key,
            "word_count": page.word_count,
            "original_word_count": page.original_word_count,
        });
        ingest_db::upsert_enrichment(&self.pool, post_id, EnrichmentKind::Crawl, payload.clone(), &url_hash).await?;

        info!(post_id = %tagged.post_id, url_hash, word_count = page.word_count, "crawled and stored");

        let base = Base::new(format!("posts.enriched:{}:{}", tagged.post_id, url_hash))?;
        let envelope = Envelope::PostsEnriched(PostsEnriched {
            base,
            post_id: tagged.post_id.clone(),
            tenant_id: tagged.tenant_id.clone(),
            enrichment: payload,
            source_urls: vec![canonical],
            word_count: page.word_count,
            original_word_count: page.original_word_count,
            skipped: false,
            skip_reason: None,
            crawl_duration_ms,
            policy_applied: "tag_match".to_string(),
            quality_score: None,
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    async fn publish_skipped(
        &self,
        tagged: &ingest_events::PostsTagged,
        reason: &str,
        crawl_duration_ms: u64,
    ) -> Result<bool> {
        let base = Base::new(format!("posts.enriched:{}:{reason}", tagged.post_id))?;
        let envelope = Envelope::PostsEnriched(PostsEnriched {
            base,
            post_id: tagged.post_id.clone(),
            tenant_id: tagged.tenant_id.clone(),
            enrichment: serde_json::Value::Null,
            source_urls: Vec::new(),
            word_count: 0,
            original_word_count: 0,
            skipped: true,
            skip_reason: Some(reason.to_string()),
            crawl_duration_ms,
            policy_applied: "tag_match".to_string(),
            quality_score: None,
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        Ok(true)
    }

    pub async fn ensure_group(&self) -> Result<()> {
        self.event_log.ensure_group("posts.tagged", GROUP).await?;
        Ok(())
    }
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(bytes);
    encoder.finish().unwrap_or_default()
}
