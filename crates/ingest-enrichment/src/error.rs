use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("crawl target too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("object store error: {0}")]
    ObjectStore(#[from] ingest_objectstore::ObjectStoreError),

    #[error("db error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("event error: {0}")]
    Event(#[from] ingest_events::EventError),
}

impl EnrichmentError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            EnrichmentError::Fetch(_) => ErrorCategory::Transient,
            EnrichmentError::TooLarge { .. } => ErrorCategory::Permanent,
            EnrichmentError::ObjectStore(e) => e.category(),
            EnrichmentError::Db(e) => e.category(),
            EnrichmentError::EventBus(_) => ErrorCategory::Transient,
            EnrichmentError::Event(_) => ErrorCategory::Permanent,
        }
    }
}

impl ingest_core::StageError for EnrichmentError {
    fn category(&self) -> ingest_core::ErrorCategory {
        EnrichmentError::category(self)
    }
}

pub type Result<T> = std::result::Result<T, EnrichmentError>;
