pub mod error;
pub mod relay;

pub use error::{OutboxError, Result};
pub use relay::OutboxRelay;
