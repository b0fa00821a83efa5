pub mod call;
pub mod client;
pub mod error;
pub mod raw;
pub mod reconnect;
pub mod worker;

pub use call::TelegramCall;
pub use client::{PlatformClient, TeloxideClient};
pub use error::{Result, TelegramError};
pub use raw::{RawMediaRef, RawMessage};
pub use reconnect::ReconnectState;
pub use worker::{IngestionWorker, MediaSink, WatchedChannel};
