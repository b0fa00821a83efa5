pub mod album;
pub mod error;
pub mod mime;
pub mod processor;

pub use album::{group_albums, AlbumGroup, AlbumNegativeCache};
pub use error::{MediaError, Result};
pub use mime::{extension_for, is_vision_eligible};
pub use processor::TelegramMediaProcessor;
