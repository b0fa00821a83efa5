use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MediaKind, MessageKind, UpdateKind};
use tracing::{instrument, warn};

use crate::error::{Result, TelegramError};
use crate::raw::{RawMediaRef, RawMessage};

/// Seam between the ingestion worker and the platform, so the worker's
/// reconnect/flood-wait/batching logic never touches a concrete Telegram
/// type directly. One `PlatformClient` is owned by exactly one
/// [`crate::worker::IngestionWorker`] task (one task per identity).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self);
    async fn is_user_authorized(&self) -> Result<bool>;
    /// Drains up to `limit` pending messages, offset by the last processed
    /// update id. Plays the role the source's `iter_messages` played, backed
    /// here by long-polling `getUpdates` the way a bot client actually
    /// receives channel traffic.
    async fn get_messages(&self, offset: i32, limit: u32) -> Result<(i32, Vec<RawMessage>)>;
    async fn download_media(&self, media: &RawMediaRef) -> Result<Vec<u8>>;
}

/// `PlatformClient` backed by a real `teloxide::Bot`, mirroring
/// `TelegramAdapter`'s ownership of one `Bot` per running adapter.
pub struct TeloxideClient {
    bot: Bot,
}

impl TeloxideClient {
    pub fn new(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(TelegramError::NoToken);
        }
        Ok(Self { bot: Bot::new(token) })
    }
}

#[async_trait]
impl PlatformClient for TeloxideClient {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<()> {
        self.bot.get_me().send().await?;
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn is_user_authorized(&self) -> Result<bool> {
        match self.bot.get_me().send().await {
            Ok(_) => Ok(true),
            Err(teloxide::RequestError::Api(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn get_messages(&self, offset: i32, limit: u32) -> Result<(i32, Vec<RawMessage>)> {
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .limit(limit.min(100) as u8)
            .timeout(0)
            .send()
            .await?;

        let mut next_offset = offset;
        let mut out = Vec::with_capacity(updates.len());
        for update in updates {
            next_offset = next_offset.max(update.id.0 as i32 + 1);
            let UpdateKind::Message(message) = update.kind else {
                continue;
            };
            out.push(to_raw_message(&message));
        }
        Ok((next_offset, out))
    }

    #[instrument(skip(self, media))]
    async fn download_media(&self, media: &RawMediaRef) -> Result<Vec<u8>> {
        let file = self.bot.get_file(&media.file_id).send().await?;
        let mut buf = Vec::new();
        teloxide::net::Download::download_file(&self.bot, &file.path, &mut buf)
            .await
            .map_err(|e| TelegramError::Api(e.to_string()))?;
        Ok(buf)
    }
}

fn to_raw_message(message: &Message) -> RawMessage {
    let text = message.text().map(str::to_owned).unwrap_or_default();
    let media = extract_media(message);
    RawMessage {
        platform_message_id: message.id.0 as i64,
        platform_channel_id: message.chat.id.0,
        grouped_id: message.media_group_id().map(|g| {
            g.as_bytes().iter().fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as i64))
        }),
        text,
        posted_at: message.date,
        media,
        is_forward: message.forward_date().is_some(),
        is_reply: message.reply_to_message().is_some(),
        views: 0,
        reactions: 0,
        forwards: 0,
        replies: 0,
        is_edited: message.edit_date().is_some(),
        edited_at: message.edit_date(),
    }
}

fn extract_media(message: &Message) -> Vec<RawMediaRef> {
    let MessageKind::Common(common) = &message.kind else {
        return Vec::new();
    };
    match &common.media_kind {
        MediaKind::Photo(photo) => photo
            .photo
            .last()
            .map(|p| {
                vec![RawMediaRef {
                    file_id: p.file.id.0.clone(),
                    mime_type: "image/jpeg".to_string(),
                    size_bytes: Some(p.file.size as u64),
                }]
            })
            .unwrap_or_default(),
        MediaKind::Document(doc) => vec![RawMediaRef {
            file_id: doc.document.file.id.0.clone(),
            mime_type: doc
                .document
                .mime_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size_bytes: Some(doc.document.file.size as u64),
        }],
        MediaKind::Video(video) => vec![RawMediaRef {
            file_id: video.video.file.id.0.clone(),
            mime_type: video
                .video
                .mime_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "video/mp4".to_string()),
            size_bytes: Some(video.video.file.size as u64),
        }],
        _ => {
            warn!("unhandled media kind, skipping attachment");
            Vec::new()
        }
    }
}
