use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed stream entry: {0}")]
    MalformedEntry(String),
}

impl EventBusError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            EventBusError::Redis(_) => ErrorCategory::Transient,
            EventBusError::Serialization(_) => ErrorCategory::Permanent,
            EventBusError::MalformedEntry(_) => ErrorCategory::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, EventBusError>;
