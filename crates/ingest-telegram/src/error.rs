use thiserror::Error;

use ingest_core::ErrorCategory;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("platform API error: {0}")]
    Api(String),

    #[error("teloxide error: {0}")]
    Teloxide(String),

    #[error("no bot token configured")]
    NoToken,

    #[error("flood-wait: retry after {0}s")]
    FloodWait(u64),

    #[error("identity unauthenticated")]
    AuthFailed,

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("database error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("rate limiter error: {0}")]
    RateLimit(#[from] ingest_ratelimit::RateLimitError),

    #[error("event construction error: {0}")]
    Event(#[from] ingest_events::EventError),
}

/// `teloxide::RequestError::RetryAfter` carries the platform's own flood-wait
/// hint; it is folded into `FloodWait` here rather than left as an opaque
/// transport error, so every call site sees one flood-wait shape regardless
/// of which layer produced it.
impl From<teloxide::RequestError> for TelegramError {
    fn from(err: teloxide::RequestError) -> Self {
        match err {
            teloxide::RequestError::RetryAfter(seconds) => TelegramError::FloodWait(seconds.seconds() as u64),
            other => TelegramError::Teloxide(other.to_string()),
        }
    }
}

impl TelegramError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TelegramError::Api(_) => ErrorCategory::Transient,
            TelegramError::Teloxide(_) => ErrorCategory::Permanent,
            TelegramError::NoToken => ErrorCategory::AuthFailed,
            TelegramError::FloodWait(wait) => ErrorCategory::FloodWait(*wait),
            TelegramError::AuthFailed => ErrorCategory::AuthFailed,
            TelegramError::EventBus(_) => ErrorCategory::Transient,
            TelegramError::Db(e) => e.category(),
            TelegramError::RateLimit(_) => ErrorCategory::Transient,
            TelegramError::Event(_) => ErrorCategory::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, TelegramError>;
