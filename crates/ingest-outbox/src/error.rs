use thiserror::Error;

use ingest_core::ErrorCategory;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),
}

impl OutboxError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OutboxError::Db(e) => e.category(),
            OutboxError::EventBus(_) => ErrorCategory::Transient,
        }
    }
}

impl ingest_core::StageError for OutboxError {
    fn category(&self) -> ErrorCategory {
        OutboxError::category(self)
    }
}

pub type Result<T> = std::result::Result<T, OutboxError>;
