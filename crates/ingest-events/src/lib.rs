pub mod envelope;
pub mod error;
pub mod hash;

pub use envelope::{
    AlbumAssembled, AlbumsParsed, Base, Envelope, MediaFileRef, PostsEnriched, PostsIndexed,
    PostsParsed, PostsTagged, TaggingTrigger, VisionAnalyzed, VisionResult, VisionSkipped,
    VisionUploaded,
};
pub use error::{EventError, Result};
pub use hash::{content_hash, features_hash, tags_hash};
