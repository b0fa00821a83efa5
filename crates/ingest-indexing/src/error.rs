use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("embedding adapter error: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("embedding skipped, no indexable text")]
    EmptyText,

    #[error("vector store error: {0}")]
    Vector(#[from] qdrant_client::QdrantError),

    #[error("graph store error: {0}")]
    Graph(#[from] neo4rs::Error),

    #[error("db error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("event error: {0}")]
    Event(#[from] ingest_events::EventError),
}

impl IndexingError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            IndexingError::Embedding(_) => ErrorCategory::Transient,
            IndexingError::DimMismatch { .. } | IndexingError::EmptyText => ErrorCategory::Permanent,
            IndexingError::Vector(_) => ErrorCategory::Transient,
            IndexingError::Graph(_) => ErrorCategory::Transient,
            IndexingError::Db(e) => e.category(),
            IndexingError::EventBus(_) => ErrorCategory::Transient,
            IndexingError::Event(_) => ErrorCategory::Permanent,
        }
    }

    /// DLQ reason strings for the two permanent failure modes C12 names.
    pub fn dlq_reason(&self) -> Option<&'static str> {
        match self {
            IndexingError::DimMismatch { .. } => Some("embed_dim_mismatch"),
            IndexingError::EmptyText => Some("empty"),
            _ => None,
        }
    }
}

impl ingest_core::StageError for IndexingError {
    fn category(&self) -> ingest_core::ErrorCategory {
        IndexingError::category(self)
    }

    fn dlq_reason(&self) -> Option<&'static str> {
        IndexingError::dlq_reason(self)
    }
}

pub type Result<T> = std::result::Result<T, IndexingError>;
