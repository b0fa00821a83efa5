use chrono::{DateTime, Utc};

/// A media attachment as seen on the wire, before it has been downloaded or
/// hashed. `ingest-media` (C7) owns the download + CAS upload step; this
/// struct only carries enough to schedule that work.
#[derive(Debug, Clone)]
pub struct RawMediaRef {
    pub file_id: String,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
}

/// One message as returned by the platform client, prior to the content_hash
/// and tenant resolution `ingest-telegram`'s worker applies before handing it
/// to the atomic batch writer.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub platform_message_id: i64,
    pub platform_channel_id: i64,
    pub grouped_id: Option<i64>,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub media: Vec<RawMediaRef>,
    pub is_forward: bool,
    pub is_reply: bool,
    pub views: i64,
    pub reactions: i64,
    pub forwards: i64,
    pub replies: i64,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
}
