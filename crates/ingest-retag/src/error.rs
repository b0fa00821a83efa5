use thiserror::Error;

use ingest_core::ErrorCategory;

#[derive(Debug, Error)]
pub enum RetagError {
    #[error("tagging adapter error: {0}")]
    Adapter(String),

    #[error("database error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("event construction error: {0}")]
    Event(#[from] ingest_events::EventError),
}

impl From<ingest_tagging::TaggingError> for RetagError {
    fn from(e: ingest_tagging::TaggingError) -> Self {
        RetagError::Adapter(e.to_string())
    }
}

impl RetagError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RetagError::Adapter(_) => ErrorCategory::Transient,
            RetagError::Db(e) => e.category(),
            RetagError::EventBus(_) => ErrorCategory::Transient,
            RetagError::Event(_) => ErrorCategory::Permanent,
        }
    }
}

impl ingest_core::StageError for RetagError {
    fn category(&self) -> ErrorCategory {
        RetagError::category(self)
    }
}

pub type Result<T> = std::result::Result<T, RetagError>;
