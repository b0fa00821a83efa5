use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision provider error: {0}")]
    Adapter(String),

    #[error("vision provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("vision result failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("object store error: {0}")]
    ObjectStore(#[from] ingest_objectstore::ObjectStoreError),

    #[error("db error: {0}")]
    Db(#[from] ingest_db::DbError),

    #[error("event bus error: {0}")]
    EventBus(#[from] ingest_eventbus::EventBusError),

    #[error("event error: {0}")]
    Event(#[from] ingest_events::EventError),
}

impl VisionError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            VisionError::Adapter(_) => ErrorCategory::Permanent,
            VisionError::ProviderUnreachable(_) => ErrorCategory::Transient,
            VisionError::SchemaInvalid(_) => ErrorCategory::Permanent,
            VisionError::Cache(_) => ErrorCategory::Transient,
            VisionError::ObjectStore(e) => e.category(),
            VisionError::Db(e) => e.category(),
            VisionError::EventBus(_) => ErrorCategory::Transient,
            VisionError::Event(_) => ErrorCategory::Permanent,
        }
    }

    /// Messages in this category exhaust the delivery-counted retry budget
    /// and route straight to DLQ once the counter trips, rather than being
    /// retried forever by the stream's own redelivery.
    pub fn is_terminal_for_this_delivery(&self) -> bool {
        matches!(
            self,
            VisionError::Adapter(_) | VisionError::SchemaInvalid(_) | VisionError::ProviderUnreachable(_)
        )
    }
}

impl ingest_core::StageError for VisionError {
    fn category(&self) -> ingest_core::ErrorCategory {
        VisionError::category(self)
    }

    fn dlq_reason(&self) -> Option<&'static str> {
        match self {
            VisionError::SchemaInvalid(_) => Some("schema_invalid"),
            VisionError::Adapter(_) => Some("adapter_error"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
