use thiserror::Error;

/// Classification of a failed write, mirroring the reason taxonomy the
/// original atomic_db_saver reported to Prometheus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    FkViolation,
    Timeout,
    ConnectionError,
    DuplicateKey,
    PermissionDenied,
    Unknown,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::FkViolation => "fk_violation",
            FailureReason::Timeout => "timeout",
            FailureReason::ConnectionError => "connection_error",
            FailureReason::DuplicateKey => "duplicate_key",
            FailureReason::PermissionDenied => "permission_denied",
            FailureReason::Unknown => "unknown",
        }
    }

    /// Classifies a raw `tokio_postgres::Error` into one of the reasons
    /// above by SQLSTATE code, the way the writer must before rolling back.
    pub fn from_pg_error(err: &tokio_postgres::Error) -> Self {
        let Some(db_err) = err.as_db_error() else {
            return FailureReason::ConnectionError;
        };
        match db_err.code() {
            c if *c == tokio_postgres::error::SqlState::FOREIGN_KEY_VIOLATION => FailureReason::FkViolation,
            c if *c == tokio_postgres::error::SqlState::UNIQUE_VIOLATION => FailureReason::DuplicateKey,
            c if *c == tokio_postgres::error::SqlState::INSUFFICIENT_PRIVILEGE => FailureReason::PermissionDenied,
            c if *c == tokio_postgres::error::SqlState::QUERY_CANCELED => FailureReason::Timeout,
            _ => FailureReason::Unknown,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("database pool configuration error: {0}")]
    PoolConfig(#[from] deadpool_postgres::CreatePoolError),

    #[error("database error ({reason}): {source}")]
    Postgres {
        reason: FailureReason,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("no active subscription for (user, channel)")]
    NoSubscription,

    #[error("subscription inactive for (user, channel)")]
    SubscriptionInactive,
}

impl DbError {
    pub fn from_pg(source: tokio_postgres::Error) -> Self {
        let reason = FailureReason::from_pg_error(&source);
        DbError::Postgres { reason, source }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            DbError::Pool(_) | DbError::PoolConfig(_) => FailureReason::ConnectionError,
            DbError::Postgres { reason, .. } => *reason,
            DbError::NoSubscription | DbError::SubscriptionInactive => FailureReason::PermissionDenied,
        }
    }

    pub fn category(&self) -> ingest_core::ErrorCategory {
        use ingest_core::ErrorCategory;
        match self {
            DbError::Pool(_) | DbError::PoolConfig(_) => ErrorCategory::Transient,
            DbError::Postgres { .. } => match self.reason() {
                FailureReason::ConnectionError | FailureReason::Timeout => ErrorCategory::Transient,
                _ => ErrorCategory::Permanent,
            },
            DbError::NoSubscription | DbError::SubscriptionInactive => ErrorCategory::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
