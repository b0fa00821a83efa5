pub mod client;
pub mod error;

pub use client::{Delivery, EventLogClient};
pub use error::{EventBusError, Result};
