use async_trait::async_trait;

use crate::error::{IndexingError, Result};

/// One embedding result. `dim` is carried alongside the vector rather than
/// inferred from its length so an adapter that silently truncates can still
/// be caught by the dimension check below.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub provider: String,
    pub dim: u32,
}

/// Seam to the embedding provider. Mirrors `ingest_tagging::AiTaggingAdapter`
/// and `ingest_vision`'s adapter trait: one async method, typed in and out,
/// no HTTP detail leaking into the stage that calls it.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Embedding, String>;
}

/// Calls the adapter and enforces the collection's fixed dimensionality
/// before the vector is ever handed to Qdrant — a dimension mismatch here
/// is a permanent, DLQ'd failure, never a retry.
pub async fn embed_text(adapter: &dyn EmbeddingAdapter, text: &str, expected_dim: u32) -> Result<Embedding> {
    if text.is_empty() {
        return Err(IndexingError::EmptyText);
    }
    let embedding = adapter.embed(text).await.map_err(IndexingError::Embedding)?;
    if embedding.dim != expected_dim || embedding.vector.len() != expected_dim as usize {
        return Err(IndexingError::DimMismatch {
            expected: expected_dim as usize,
            got: embedding.vector.len(),
        });
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdapter(Vec<f32>);

    #[async_trait]
    impl EmbeddingAdapter for FixedAdapter {
        async fn embed(&self, _text: &str) -> std::result::Result<Embedding, String> {
            Ok(Embedding { vector: self.0.clone(), provider: "fixed".to_string(), dim: self.0.len() as u32 })
        }
    }

    #[tokio::test]
    async fn mismatched_dimension_is_rejected() {
        let adapter = FixedAdapter(vec![0.0; 3]);
        let err = embed_text(&adapter, "hello", 8).await.unwrap_err();
        assert!(matches!(err, IndexingError::DimMismatch { expected: 8, got: 3 }));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_calling_the_adapter() {
        let adapter = FixedAdapter(vec![0.0; 3]);
        let err = embed_text(&adapter, "", 3).await.unwrap_err();
        assert!(matches!(err, IndexingError::EmptyText));
    }
}
