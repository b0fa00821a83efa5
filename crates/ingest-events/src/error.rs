use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("idempotency_key must not be empty")]
    EmptyIdempotencyKey,

    #[error("refusing to publish {0} without a resolved tenant_id")]
    UnresolvedTenant(String),

    #[error("envelope schema invalid: {0}")]
    SchemaInvalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            EventError::EmptyIdempotencyKey => ErrorCategory::Permanent,
            EventError::UnresolvedTenant(_) => ErrorCategory::Permanent,
            EventError::SchemaInvalid(_) => ErrorCategory::Permanent,
            EventError::Serialization(_) => ErrorCategory::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, EventError>;
