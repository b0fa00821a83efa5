pub mod error;
pub mod keys;
pub mod quota;
pub mod store;

pub use error::{ObjectStoreError, Result};
pub use keys::ContentType;
pub use quota::{check_quota, over_emergency_threshold, QuotaDecision, QuotaLimits, UsageSnapshot};
pub use store::{rank_eviction_candidates, EvictionCandidate, ObjectStore, PutResult};
