pub mod error;
pub mod floodwait;
pub mod keys;
pub mod window;

pub use error::{RateLimitError, Result};
pub use floodwait::FloodWaitManager;
pub use keys::RateScope;
pub use window::{CheckResult, SlidingWindowLimiter};
