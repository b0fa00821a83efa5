use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingest_db::types::{PostRecord, WrittenPost};
use ingest_db::{AtomicBatchWriter, ChannelDescriptor, UserDescriptor};
use ingest_eventbus::EventLogClient;
use ingest_events::{content_hash, Base, Envelope, PostsParsed, TaggingTrigger};
use ingest_ratelimit::FloodWaitManager;
use rand::Rng;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::call::TelegramCall;
use crate::client::PlatformClient;
use crate::error::{Result, TelegramError};
use crate::raw::RawMediaRef;
use crate::reconnect::ReconnectState;

const WATCHDOG_TICK: Duration = Duration::from_secs(20);
const KEEPALIVE_MIN_INTERVAL: Duration = Duration::from_secs(150);

/// Handed a batch of media attachments for one post; `ingest-media` (C7)
/// implements this by downloading, hashing, quota-checking and uploading to
/// the content-addressed store. Kept as a trait here so `ingest-telegram`
/// never depends on `ingest-media` directly — `ingestd` wires the two
/// together.
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn dispatch(&self, tenant_id: &str, post_id: Uuid, media: Vec<RawMediaRef>) -> Vec<String>;
}

/// One channel this worker polls on behalf of its identity.
#[derive(Debug, Clone)]
pub struct WatchedChannel {
    pub descriptor: ChannelDescriptor,
    pub user_id: String,
}

/// Drives one Telegram identity's polling loop end-to-end: reconnect with
/// backoff, per-cycle adaptive-batch `get_messages`, atomic batch write, and
/// `posts.parsed` publication gated on genuinely new rows. Per the "one task
/// per identity" design note, exactly one of these runs per identity and owns
/// its `PlatformClient` exclusively.
pub struct IngestionWorker {
    pub account_id: String,
    pub client: Arc<dyn PlatformClient>,
    pub floodwait: FloodWaitManager,
    pub writer: Arc<AtomicBatchWriter>,
    pub event_log: EventLogClient,
    pub media_sink: Arc<dyn MediaSink>,
    pub channels: Vec<WatchedChannel>,
}

impl IngestionWorker {
    /// Runs until `connect` fails enough times within 15 minutes to trip the
    /// unauthenticated threshold, at which point the caller (the supervisor)
    /// is responsible for marking the identity `unauthenticated` and its
    /// channels `on_hold`.
    #[instrument(skip(self), fields(account_id = %self.account_id))]
    pub async fn run(&self) -> Result<()> {
        let mut reconnect = ReconnectState::default();
        let mut update_offset: i32 = 0;
        let mut last_keepalive = std::time::Instant::now() - KEEPALIVE_MIN_INTERVAL;
        let mut watchdog = tokio::time::interval(WATCHDOG_TICK);

        loop {
            watchdog.tick().await;

            if let Err(e) = self.client.connect().await {
                warn!(error = %e, "connect failed");
                let delay = reconnect.on_failure();
                if reconnect.should_mark_unauthenticated() {
                    error!(account_id = %self.account_id, "10+ reconnect failures in 15m, marking unauthenticated");
                    return Err(TelegramError::AuthFailed);
                }
                tokio::time::sleep(delay).await;
                continue;
            }
            reconnect.on_success();

            if last_keepalive.elapsed() >= KEEPALIVE_MIN_INTERVAL {
                let _ = self.client.is_user_authorized().await;
                last_keepalive = std::time::Instant::now();
            }

            match self.poll_cycle(&mut update_offset).await {
                Ok(()) => {}
                Err(TelegramError::FloodWait(wait)) => {
                    info!(wait, "poll cycle deferred by flood-wait");
                }
                Err(e) => warn!(error = %e, "poll cycle failed"),
            }

            let jitter: f64 = rand::thread_rng().gen_range(0.8..1.2);
            tokio::time::sleep(Duration::from_secs_f64(2.0 * jitter)).await;
        }
    }

    #[instrument(skip(self, update_offset))]
    async fn poll_cycle(&self, update_offset: &mut i32) -> Result<()> {
        let batch_size = self.floodwait.adaptive_batch_size(&self.account_id, None).await;

        let mut by_channel: HashMap<i64, Vec<&WatchedChannel>> = HashMap::new();
        for ch in &self.channels {
            if self.floodwait.is_in_cooldown(&ch.descriptor.platform_channel_id.to_string()).await {
                continue;
            }
            by_channel.entry(ch.descriptor.platform_channel_id).or_default().push(ch);
        }
        if by_channel.is_empty() {
            return Ok(());
        }

        let call = TelegramCall::new(&self.floodwait, &self.account_id, "get_messages");
        let (next_offset, messages) = match call.invoke(|| self.client.get_messages(*update_offset, batch_size)).await {
            Ok(v) => v,
            Err(TelegramError::FloodWait(wait)) if wait > 60 => {
                // getUpdates is account-wide rather than per-channel, so a
                // flood-wait longer than 60s is attributed to every channel
                // this cycle would otherwise have polled.
                for &channel_id in by_channel.keys() {
                    if let Err(e) = self.floodwait.enter_cooldown(&channel_id.to_string(), wait).await {
                        warn!(error = %e, channel_id, "failed to record channel cool-down");
                    }
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        *update_offset = next_offset;

        let mut grouped: HashMap<i64, Vec<crate::raw::RawMessage>> = HashMap::new();
        for msg in messages {
            grouped.entry(msg.platform_channel_id).or_default().push(msg);
        }

        for (platform_channel_id, raw_posts) in grouped {
            let Some(watched) = by_channel.get(&platform_channel_id).and_then(|v| v.first()) else {
                continue;
            };
            self.write_channel_batch(watched, raw_posts).await;
        }
        Ok(())
    }

    async fn write_channel_batch(&self, watched: &&WatchedChannel, raw_posts: Vec<crate::raw::RawMessage>) {
        let user = UserDescriptor { platform_id: watched.user_id.parse().unwrap_or_default(), encrypted_session: None };
        let posts: Vec<PostRecord> = raw_posts
            .iter()
            .map(|m| to_post_record(m, &watched.descriptor.tenant_id))
            .collect();

        let outcome = match self.writer.write_batch(&user, &watched.descriptor, &posts).await {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, channel = %watched.descriptor.platform_channel_id, "batch write failed");
                return;
            }
        };

        for (written, raw) in outcome.written.iter().zip(raw_posts.iter()) {
            if !written.inserted {
                continue;
            }

            let media_shas = if raw.media.is_empty() {
                Vec::new()
            } else {
                self.media_sink.dispatch(&watched.descriptor.tenant_id, written.id, raw.media.clone()).await
            };

            let envelope = match build_posts_parsed(watched, written, raw, &media_shas) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to build posts.parsed envelope");
                    continue;
                }
            };
            if let Err(e) = self.event_log.publish(&envelope).await {
                warn!(error = %e, "failed to publish posts.parsed");
            }
        }
    }
}

fn to_post_record(raw: &crate::raw::RawMessage, tenant_id: &str) -> PostRecord {
    PostRecord {
        tenant_id: tenant_id.to_string(),
        platform_message_id: raw.platform_message_id,
        text: if raw.text.is_empty() { None } else { Some(raw.text.clone()) },
        posted_at: raw.posted_at,
        has_media: !raw.media.is_empty(),
        is_forward: raw.is_forward,
        is_reply: raw.is_reply,
        views: raw.views,
        reactions: raw.reactions,
        forwards: raw.forwards,
        replies: raw.replies,
        is_edited: raw.is_edited,
        edited_at: raw.edited_at,
    }
}

fn build_posts_parsed(
    watched: &WatchedChannel,
    written: &WrittenPost,
    raw: &crate::raw::RawMessage,
    media_shas: &[String],
) -> Result<Envelope> {
    let idempotency_key = format!("posts.parsed:{}:{}", watched.descriptor.platform_channel_id, raw.platform_message_id);
    let base = Base::new(idempotency_key)?;
    let hash = content_hash(&raw.text);
    let urls = extract_urls(&raw.text);

    let envelope = Envelope::PostsParsed(PostsParsed {
        base,
        user_id: watched.user_id.clone(),
        channel_id: watched.descriptor.platform_channel_id.to_string(),
        post_id: written.id.to_string(),
        tenant_id: watched.descriptor.tenant_id.clone(),
        text: raw.text.clone(),
        link_count: urls.len() as u32,
        urls,
        posted_at: raw.posted_at,
        content_hash: hash,
        media_sha256_list: media_shas.to_vec(),
        platform_message_id: raw.platform_message_id,
        platform_channel_id: watched.descriptor.platform_channel_id,
        is_forward: raw.is_forward,
        is_reply: raw.is_reply,
        has_media: !raw.media.is_empty(),
        trigger: TaggingTrigger::Initial,
    });
    envelope.validate()?;
    Ok(envelope)
}

fn extract_urls(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|w| w.starts_with("http://") || w.starts_with("https://"))
        .map(|w| w.trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | '"')).to_string())
        .collect()
}
