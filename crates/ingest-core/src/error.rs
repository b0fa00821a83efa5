use thiserror::Error;

/// Cross-cutting error classification, independent of which component raised
/// the error. Stage runners branch on this instead of catching a source
/// exception taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network/timeout/5xx, KV unavailable, DB connection_error/timeout.
    /// Policy: do not ack; PEL + reclaim will redeliver.
    Transient,
    /// Schema validation failure, no_text, embed_dim_mismatch, fk_violation.
    /// Policy: ack, then publish to the stage DLQ.
    Permanent,
    /// Platform flood-wait; sleep and retry, never DLQ.
    FloodWait(u64),
    /// Identity-level auth failure; terminal for that identity.
    AuthFailed,
    /// Already processed; ack silently, no DLQ, no downstream event.
    Idempotent,
    /// Quota denial, unsupported format, budget exhausted.
    ResourceSkip,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("tenant resolution failed: {0}")]
    TenantUnresolved(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::TenantUnresolved(_) => "TENANT_UNRESOLVED",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Config(_) => ErrorCategory::Permanent,
            CoreError::TenantUnresolved(_) => ErrorCategory::Permanent,
            CoreError::Serialization(_) => ErrorCategory::Permanent,
            CoreError::Io(_) => ErrorCategory::Transient,
            CoreError::Internal(_) => ErrorCategory::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Implemented by every stage crate's error enum so a single generic
/// consumer loop can decide ack / leave-unacked / dead-letter without
/// knowing the concrete error type. `category()` already exists as an
/// inherent method on each stage error; this trait just gives the runner a
/// uniform name to call it by, plus an optional DLQ reason string to tag the
/// dead-lettered entry with.
pub trait StageError: std::fmt::Display {
    fn category(&self) -> ErrorCategory;

    /// Short machine-readable reason recorded alongside a dead-lettered
    /// delivery. Defaults to `None`, meaning the runner falls back to the
    /// error's `Display` text.
    fn dlq_reason(&self) -> Option<&'static str> {
        None
    }
}
