use chrono::Utc;
use deadpool_postgres::Pool;
use ingest_events::{AlbumAssembled, Base, Envelope};
use ingest_eventbus::{Delivery, EventLogClient};
use ingest_objectstore::keys::album_summary_key;
use ingest_objectstore::ObjectStore;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::state::{self, AlbumState, AnalyzedItem};

const GROUP: &str = "ingest-albums";

pub struct AlbumAssembler {
    pub event_log: EventLogClient,
    pub redis: ConnectionManager,
    pub pool: Pool,
    pub store: Arc<ObjectStore>,
}

impl AlbumAssembler {
    #[instrument(skip(self, delivery))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<bool> {
        match &delivery.envelope {
            Envelope::AlbumsParsed(parsed) => {
                if state::load(&self.redis, &parsed.album_id).await?.is_none() {
                    let seeded = AlbumState::seed(
                        parsed.album_id.clone(),
                        parsed.tenant_id.clone(),
                        parsed.channel_id.clone(),
                        parsed.items_count,
                    );
                    state::save(&self.redis, &seeded).await?;
                }
                Ok(true)
            }
            Envelope::VisionAnalyzed(analyzed) => {
                let post_id: Uuid = match analyzed.post_id.parse() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(post_id = %analyzed.post_id, "malformed post_id, dropping");
                        return Ok(true);
                    }
                };

                let Some(album_id) = ingest_db::fetch_album_id_for_post(&self.pool, post_id).await? else {
                    return Ok(true);
                };
                let album_id_str = album_id.to_string();

                let mut state = match state::load(&self.redis, &album_id_str).await? {
                    Some(s) => s,
                    None => {
                        let Some(album) = ingest_db::fetch_album(&self.pool, album_id).await? else {
                            warn!(%album_id, "post references album missing from db, dropping");
                            return Ok(true);
                        };
                        AlbumState::seed(
                            album_id_str.clone(),
                            analyzed.tenant_id.clone(),
                            album.channel_id.to_string(),
                            album.items_count as u32,
                        )
                    }
                };

                let item = AnalyzedItem {
                    post_id: analyzed.post_id.clone(),
                    labels: analyzed.vision.labels.clone(),
                    ocr_text: analyzed.vision.ocr_text.clone(),
                    is_meme: analyzed.vision.is_meme,
                };
                state.add_item(item, Utc::now());

                if state.is_complete() {
                    self.assemble_and_publish(state).await
                } else {
                    state::save(&self.redis, &state).await?;
                    Ok(true)
                }
            }
            _ => Ok(true),
        }
    }

    async fn assemble_and_publish(&self, state: AlbumState) -> Result<bool> {
        let mut labels: Vec<String> = state.items_analyzed.iter().flat_map(|i| i.labels.clone()).collect();
        labels.sort();
        labels.dedup();

        let has_meme = state.items_analyzed.iter().any(|i| i.is_meme);
        let has_text = state
            .items_analyzed
            .iter()
            .any(|i| i.ocr_text.as_ref().is_some_and(|t| !t.trim().is_empty()));

        let summary = serde_json::json!({
            "album_id": state.album_id,
            "items_analyzed": state.items_analyzed,
        });
        let key = album_summary_key(&state.tenant_id, &state.album_id, false);
        self.store.put(&key, serde_json::to_vec(&summary).unwrap_or_default()).await?;

        let base = Base::new(format!("album.assembled:{}", state.album_id))?;
        let envelope = Envelope::AlbumAssembled(AlbumAssembled {
            base,
            tenant_id: state.tenant_id.clone(),
            album_id: state.album_id.clone(),
            items_analyzed: state.items_analyzed.len() as u32,
            labels,
            has_meme,
            has_text,
            s3_key: key,
            assembly_lag_seconds: state.assembly_lag_seconds(),
        });
        envelope.validate()?;
        self.event_log.publish(&envelope).await?;
        state::delete(&self.redis, &state.album_id).await?;
        Ok(true)
    }

    pub async fn ensure_group(&self) -> Result<()> {
        self.event_log.ensure_group("albums.parsed", GROUP).await?;
        self.event_log.ensure_group("posts.vision.analyzed", GROUP).await?;
        Ok(())
    }
}
