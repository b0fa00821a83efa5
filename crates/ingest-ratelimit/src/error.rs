use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("shared KV error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RateLimitError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        ingest_core::ErrorCategory::Transient
    }
}

pub type Result<T> = std::result::Result<T, RateLimitError>;
