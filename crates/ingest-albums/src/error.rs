use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlbumError {
    #[error("album state cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("malformed album state: {0}")]
    MalformedState(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] ingest_objectstore::ObjectStoreError),

    #[error("db error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("event error: {0}")]
    Event(#[from] ingest_events::EventError),
}

impl AlbumError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            AlbumError::Cache(_) => ErrorCategory::Transient,
            AlbumError::MalformedState(_) => ErrorCategory::Permanent,
            AlbumError::ObjectStore(e) => e.category(),
            AlbumError::Db(e) => e.category(),
            AlbumError::EventBus(_) => ErrorCategory::Transient,
            AlbumError::Event(_) => ErrorCategory::Permanent,
        }
    }
}

impl ingest_core::StageError for AlbumError {
    fn category(&self) -> ingest_core::ErrorCategory {
        AlbumError::category(self)
    }
}

pub type Result<T> = std::result::Result<T, AlbumError>;
