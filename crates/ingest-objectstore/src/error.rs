use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("blob store error: {0}")]
    Backend(String),

    #[error("quota denied for tenant {tenant}: {reason}")]
    QuotaDenied { tenant: String, reason: String },

    #[error("object exceeds per-object cap: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
}

impl ObjectStoreError {
    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            ObjectStoreError::Backend(_) => ErrorCategory::Transient,
            ObjectStoreError::QuotaDenied { .. } => ErrorCategory::ResourceSkip,
            ObjectStoreError::TooLarge { .. } => ErrorCategory::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;
