use thiserror::Error;

use ingest_core::ErrorCategory;

#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("tagging adapter error: {0}")]
    Adapter(String),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("event construction error: {0}")]
    Event(#[from] ingest_events::EventError),
}

impl TaggingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TaggingError::Adapter(_) => ErrorCategory::Transient,
            TaggingError::Cache(_) => ErrorCategory::Transient,
            TaggingError::Db(e) => e.category(),
            TaggingError::EventBus(_) => ErrorCategory::Transient,
            TaggingError::Event(_) => ErrorCategory::Permanent,
        }
    }
}

impl ingest_core::StageError for TaggingError {
    fn category(&self) -> ErrorCategory {
        TaggingError::category(self)
    }
}

pub type Result<T> = std::result::Result<T, TaggingError>;
