use async_trait::async_trait;
use ingest_core::config::AdapterEndpointConfig;
use ingest_events::VisionResult;
use ingest_indexing::{Embedding, EmbeddingAdapter};
use ingest_tagging::{AiTaggingAdapter, TaggingContext, TaggingOutcome};
use ingest_vision::{OcrFallbackAdapter, VisionAdapter, VisionAdapterOutcome, VisionError};
use serde::Deserialize;
use tracing::instrument;

/// Thin HTTP client shared by every adapter below, built the way
/// `ingest_enrichment::crawler::fetch` builds its request: one bounded
/// timeout, no retry loop of its own (the stage/runner loop already retries
/// on `ErrorCategory::Transient`).
fn http_client(timeout_s: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_s))
        .build()
        .expect("static reqwest client config is valid")
}

/// Calls an OpenAI-chat-compatible `/v1/chat/completions` endpoint, asking
/// the model for a strict JSON object of tags/topics. Works against any
/// provider that speaks the same wire shape (GigaChat, vLLM, etc.) by
/// pointing `base_url` at it.
pub struct HttpTaggingAdapter {
    client: reqwest::Client,
    config: AdapterEndpointConfig,
}

impl HttpTaggingAdapter {
    pub fn new(config: AdapterEndpointConfig) -> Self {
        Self { client: http_client(config.timeout_s), config }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct TagCompletion {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
}

#[async_trait]
impl AiTaggingAdapter for HttpTaggingAdapter {
    #[instrument(skip(self, text, context))]
    async fn tag(&self, text: &str, context: &TaggingContext) -> ingest_tagging::Result<TaggingOutcome> {
        let started = std::time::Instant::now();
        let prompt = build_tagging_prompt(text, &context.facets);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "response_format": {"type": "json_object"},
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .map_err(|e| ingest_tagging::TaggingError::Adapter(e.to_string()))?
            .error_for_status()
            .map_err(|e| ingest_tagging::TaggingError::Adapter(e.to_string()))?;

        let body: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ingest_tagging::TaggingError::Adapter(e.to_string()))?;

        let raw = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        let parsed: TagCompletion = serde_json::from_str(&raw).unwrap_or_default();

        Ok(TaggingOutcome {
            tags: parsed.tags,
            topics: parsed.topics,
            provider: self.config.model.clone(),
            tokens_used: 0,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn build_tagging_prompt(text: &str, facets: &[String]) -> String {
    if facets.is_empty() {
        format!(
            "Return a JSON object {{\"tags\": [...], \"topics\": [...]}} classifying this post:\n\n{text}"
        )
    } else {
        format!(
            "Return a JSON object {{\"tags\": [...], \"topics\": [...]}} classifying this post, \
             taking the following known facets into account: {}.\n\n{text}",
            facets.join(", ")
        )
    }
}

/// Vision analysis over an OpenAI-chat-compatible vision endpoint: the image
/// is base64-inlined into a multimodal message, same shape as the tagging
/// adapter's completion call.
pub struct HttpVisionAdapter {
    client: reqwest::Client,
    config: AdapterEndpointConfig,
}

impl HttpVisionAdapter {
    pub fn new(config: AdapterEndpointConfig) -> Self {
        Self { client: http_client(config.timeout_s), config }
    }
}

#[derive(Deserialize, Default)]
struct VisionCompletion {
    #[serde(default)]
    classification: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    objects: Vec<String>,
    #[serde(default)]
    is_meme: bool,
    #[serde(default)]
    ocr_text: Option<String>,
    #[serde(default)]
    nsfw_score: Option<f64>,
    #[serde(default)]
    aesthetic_score: Option<f64>,
    #[serde(default)]
    dominant_colors: Vec<String>,
}

#[async_trait]
impl VisionAdapter for HttpVisionAdapter {
    #[instrument(skip(self, image_bytes))]
    async fn analyze(&self, image_bytes: &[u8], mime_type: &str) -> ingest_vision::Result<VisionAdapterOutcome> {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let data_url = format!("data:{mime_type};base64,{b64}");

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "response_format": {"type": "json_object"},
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "Return a JSON object describing this image: classification, description, labels, objects, is_meme, ocr_text, nsfw_score, aesthetic_score, dominant_colors."},
                        {"type": "image_url", "image_url": {"url": data_url}},
                    ],
                }],
            }))
            .send()
            .await
            .map_err(|e| VisionError::ProviderUnreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| VisionError::ProviderUnreachable(e.to_string()))?;

        let body: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::Adapter(e.to_string()))?;

        let raw = body.choices.first().map(|c| c.message.content.clone()).unwrap_or_default();
        let parsed: VisionCompletion = serde_json::from_str(&raw).map_err(|e| VisionError::Adapter(e.to_string()))?;

        Ok(VisionAdapterOutcome {
            result: VisionResult {
                classification: parsed.classification,
                description: parsed.description,
                labels: parsed.labels,
                objects: parsed.objects,
                is_meme: parsed.is_meme,
                ocr_text: parsed.ocr_text,
                nsfw_score: parsed.nsfw_score,
                aesthetic_score: parsed.aesthetic_score,
                dominant_colors: parsed.dominant_colors,
            },
            provider: "http-vision".to_string(),
            model: self.config.model.clone(),
            tokens_used: 0,
        })
    }
}

/// Degraded text-extraction path used when the primary vision provider is
/// down and policy allows a fallback (spec §4.10). Points at a separate,
/// usually cheaper, OCR-only endpoint.
pub struct HttpOcrFallbackAdapter {
    client: reqwest::Client,
    config: AdapterEndpointConfig,
}

impl HttpOcrFallbackAdapter {
    pub fn new(config: AdapterEndpointConfig) -> Self {
        Self { client: http_client(config.timeout_s), config }
    }
}

#[derive(Deserialize, Default)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl OcrFallbackAdapter for HttpOcrFallbackAdapter {
    #[instrument(skip(self, image_bytes))]
    async fn ocr(&self, image_bytes: &[u8]) -> ingest_vision::Result<String> {
        let resp = self
            .client
            .post(format!("{}/ocr", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .body(image_bytes.to_vec())
            .send()
            .await
            .map_err(|e| VisionError::ProviderUnreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| VisionError::ProviderUnreachable(e.to_string()))?;

        let body: OcrResponse = resp.json().await.map_err(|e| VisionError::Adapter(e.to_string()))?;
        Ok(body.text)
    }
}

/// Calls an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbeddingAdapter {
    client: reqwest::Client,
    config: AdapterEndpointConfig,
}

impl HttpEmbeddingAdapter {
    pub fn new(config: AdapterEndpointConfig) -> Self {
        Self { client: http_client(config.timeout_s), config }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingAdapter for HttpEmbeddingAdapter {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Embedding, String> {
        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({ "model": self.config.model, "input": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let body: EmbeddingResponse = resp.json().await.map_err(|e| e.to_string())?;
        let vector = body.data.into_iter().next().map(|d| d.embedding).unwrap_or_default();
        let dim = vector.len() as u32;
        Ok(Embedding { vector, provider: self.config.model.clone(), dim })
    }
}
