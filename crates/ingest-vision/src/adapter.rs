use async_trait::async_trait;
use ingest_events::VisionResult;

use crate::error::Result;

pub struct VisionAdapterOutcome {
    pub result: VisionResult,
    pub provider: String,
    pub model: String,
    pub tokens_used: u32,
}

/// Vendor-agnostic seam for the vision model call, analogous to
/// `ingest_tagging::AiTaggingAdapter`. A concrete implementation (e.g. a
/// GigaChat Vision client) lives in `ingestd` and is injected here.
#[async_trait]
pub trait VisionAdapter: Send + Sync {
    async fn analyze(&self, image_bytes: &[u8], mime_type: &str) -> Result<VisionAdapterOutcome>;
}

/// Best-effort text extraction used when the primary provider is
/// unreachable and the policy allows a degraded result.
#[async_trait]
pub trait OcrFallbackAdapter: Send + Sync {
    async fn ocr(&self, image_bytes: &[u8]) -> Result<String>;
}
