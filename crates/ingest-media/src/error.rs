use thiserror::Error;

use ingest_core::ErrorCategory;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("download failed: {0}")]
    Download(#[from] ingest_telegram::TelegramError),

    #[error("object store error: {0}")]
    Store(#[from] ingest_objectstore::ObjectStoreError),

    #[error("quota denied: {0}")]
    QuotaDenied(String),

    #[error("object too large: {size_bytes} bytes (limit {limit_bytes})")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("negative cache error: {0}")]
    NegativeCache(#[from] redis::RedisError),

    #[error("event construction error: {0}")]
    Event(#[from] ingest_events::EventError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),
}

impl MediaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Download(e) => e.category(),
            MediaError::Store(_) => ErrorCategory::Transient,
            MediaError::QuotaDenied(_) => ErrorCategory::ResourceSkip,
            MediaError::TooLarge { .. } => ErrorCategory::ResourceSkip,
            MediaError::NegativeCache(_) => ErrorCategory::Transient,
            MediaError::Event(_) => ErrorCategory::Permanent,
            MediaError::EventBus(_) => ErrorCategory::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
