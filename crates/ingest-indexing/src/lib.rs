pub mod embedding;
pub mod error;
pub mod graph;
pub mod payload;
pub mod stage;
pub mod text;
pub mod vector;

pub use embedding::{embed_text, Embedding, EmbeddingAdapter};
pub use error::{IndexingError, Result};
pub use graph::{extract_entities, write_post, GraphWriteCounts, PostGraphInput};
pub use payload::{build_payload, VectorPayload};
pub use stage::IndexingStage;
pub use text::compose_embedding_text;
pub use vector::VectorStore;
