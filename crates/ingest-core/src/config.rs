use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (ingest.toml + INGEST_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub album: AlbumConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub blob: BlobConfig,
    pub qdrant: QdrantConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            media: MediaConfig::default(),
            album: AlbumConfig::default(),
            quota: QuotaConfig::default(),
            rate: RateConfig::default(),
            supervisor: SupervisorConfig::default(),
            graph: GraphConfig::default(),
            vision: VisionConfig::default(),
            indexing: IndexingConfig::default(),
            crawl: CrawlConfig::default(),
            adapters: AdaptersConfig::default(),
            telegram: TelegramConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/ingest".to_string(),
                max_pool_size: 16,
            },
            redis: RedisConfig {
                url: "redis://localhost".to_string(),
            },
            blob: BlobConfig {
                endpoint: "http://localhost:9000".to_string(),
                bucket: "ingest".to_string(),
                region: "us-east-1".to_string(),
                access_key: String::new(),
                secret_key: String::new(),
            },
            qdrant: QdrantConfig {
                url: "http://localhost:6334".to_string(),
                neo4j_url: "bolt://localhost:7687".to_string(),
                neo4j_user: "neo4j".to_string(),
                neo4j_password: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    #[serde(default = "default_trim_interval_msgs")]
    pub trim_interval_msgs: u32,
    #[serde(default = "default_pel_min_idle_ms")]
    pub pel_min_idle_ms: u64,
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            trim_interval_msgs: default_trim_interval_msgs(),
            pel_min_idle_ms: default_pel_min_idle_ms(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_max_bytes_photo")]
    pub max_bytes_photo: u64,
    #[serde(default = "default_max_bytes_doc")]
    pub max_bytes_doc: u64,
    #[serde(default = "default_download_timeout_photo_s")]
    pub download_timeout_photo_s: u64,
    #[serde(default = "default_download_timeout_doc_s")]
    pub download_timeout_doc_s: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_bytes_photo: default_max_bytes_photo(),
            max_bytes_doc: default_max_bytes_doc(),
            download_timeout_photo_s: default_download_timeout_photo_s(),
            download_timeout_doc_s: default_download_timeout_doc_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumConfig {
    #[serde(default = "default_album_search_window_minutes")]
    pub search_window_minutes: i64,
    #[serde(default = "default_album_search_limit")]
    pub search_limit: u32,
}

impl Default for AlbumConfig {
    fn default() -> Self {
        Self {
            search_window_minutes: default_album_search_window_minutes(),
            search_limit: default_album_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_bucket_total_gb")]
    pub bucket_total_gb: f64,
    #[serde(default = "default_bucket_emergency_gb")]
    pub bucket_emergency_gb: f64,
    #[serde(default = "default_per_tenant_gb")]
    pub per_tenant_gb: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            bucket_total_gb: default_bucket_total_gb(),
            bucket_emergency_gb: default_bucket_emergency_gb(),
            per_tenant_gb: default_per_tenant_gb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_user_per_minute")]
    pub user_per_minute: u32,
    #[serde(default = "default_channel_per_minute")]
    pub channel_per_minute: u32,
    #[serde(default = "default_global_per_minute")]
    pub global_per_minute: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            user_per_minute: default_user_per_minute(),
            channel_per_minute: default_channel_per_minute(),
            global_per_minute: default_global_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_s")]
    pub initial_backoff_s: u64,
    #[serde(default = "default_max_backoff_s")]
    pub max_backoff_s: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_s: default_initial_backoff_s(),
            max_backoff_s: default_max_backoff_s(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_post_expires_days")]
    pub post_expires_days: i64,
    #[serde(default = "default_neo4j_url")]
    pub neo4j_url: String,
    #[serde(default = "default_neo4j_user")]
    pub neo4j_user: String,
    #[serde(default)]
    pub neo4j_password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            post_expires_days: default_post_expires_days(),
            neo4j_url: default_neo4j_url(),
            neo4j_user: default_neo4j_user(),
            neo4j_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_max_deliveries")]
    pub max_deliveries: u32,
    #[serde(default = "default_vision_idempotency_ttl_h")]
    pub idempotency_ttl_h: u64,
    #[serde(default = "default_vision_daily_token_budget")]
    pub per_tenant_daily_token_budget: u64,
    #[serde(default = "default_vision_tokens_per_image")]
    pub estimated_tokens_per_image: u64,
    #[serde(default = "default_vision_allow_ocr_fallback")]
    pub allow_ocr_fallback: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_deliveries: default_vision_max_deliveries(),
            idempotency_ttl_h: default_vision_idempotency_ttl_h(),
            per_tenant_daily_token_budget: default_vision_daily_token_budget(),
            estimated_tokens_per_image: default_vision_tokens_per_image(),
            allow_ocr_fallback: default_vision_allow_ocr_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_indexing_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: u32,
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_indexing_concurrency(),
            embedding_dim: default_embedding_dim(),
            embedding_provider: default_embedding_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Tags matching any of these (substring, case-insensitive) gate a post
    /// into the crawler; everything else is `skip_reason = tag_mismatch`.
    #[serde(default = "default_crawl_tag_patterns")]
    pub tag_patterns: Vec<String>,
    #[serde(default = "default_crawl_timeout_s")]
    pub fetch_timeout_s: u64,
    #[serde(default = "default_crawl_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_remove_trailing_slash")]
    pub remove_trailing_slash: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            tag_patterns: default_crawl_tag_patterns(),
            fetch_timeout_s: default_crawl_timeout_s(),
            max_bytes: default_crawl_max_bytes(),
            user_agent: default_crawl_user_agent(),
            remove_trailing_slash: default_remove_trailing_slash(),
        }
    }
}

/// Endpoint settings for one of the adapter seams (tagging/vision/embedding).
/// ingestd binds each to a concrete HTTP client; the stage crates only see
/// the `AiTaggingAdapter`/`VisionAdapter`/`EmbeddingAdapter` traits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_adapter_model")]
    pub model: String,
    #[serde(default = "default_adapter_timeout_s")]
    pub timeout_s: u64,
}

impl Default for AdapterEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: default_adapter_model(),
            timeout_s: default_adapter_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub tagging: AdapterEndpointConfig,
    #[serde(default)]
    pub vision: AdapterEndpointConfig,
    #[serde(default)]
    pub embedding: AdapterEndpointConfig,
    #[serde(default = "default_ocr_fallback_base_url")]
    pub ocr_fallback: AdapterEndpointConfig,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            tagging: AdapterEndpointConfig::default(),
            vision: AdapterEndpointConfig::default(),
            embedding: AdapterEndpointConfig::default(),
            ocr_fallback: default_ocr_fallback_base_url(),
        }
    }
}

fn default_ocr_fallback_base_url() -> AdapterEndpointConfig {
    AdapterEndpointConfig::default()
}

fn default_adapter_model() -> String {
    String::new()
}
fn default_adapter_timeout_s() -> u64 {
    30
}

/// One Telegram identity `ingestd` logs in as, plus the channels it polls.
/// Bootstrapped from config rather than a DB table: decrypting a stored
/// session is out of scope here, so the bot token lives in config/env same
/// as every other credential in this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramAccountConfig {
    pub platform_id: i64,
    pub bot_token: String,
    pub tenant_id: String,
    pub channels: Vec<TelegramChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    pub platform_channel_id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub accounts: Vec<TelegramAccountConfig>,
}

/// Bind address for the `/metrics` Prometheus exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_bind")]
    pub bind: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { bind: default_metrics_bind() }
    }
}

fn default_metrics_bind() -> String {
    "0.0.0.0:9477".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    #[serde(default = "default_neo4j_url")]
    pub neo4j_url: String,
    #[serde(default = "default_neo4j_user")]
    pub neo4j_user: String,
    #[serde(default)]
    pub neo4j_password: String,
}

fn default_batch_size() -> u32 {
    50
}
fn default_block_ms() -> u64 {
    1000
}
fn default_trim_interval_msgs() -> u32 {
    50
}
fn default_pel_min_idle_ms() -> u64 {
    60_000
}
fn default_max_deliveries() -> u32 {
    3
}
fn default_max_bytes_photo() -> u64 {
    15 * 1024 * 1024
}
fn default_max_bytes_doc() -> u64 {
    40 * 1024 * 1024
}
fn default_download_timeout_photo_s() -> u64 {
    120
}
fn default_download_timeout_doc_s() -> u64 {
    300
}
fn default_album_search_window_minutes() -> i64 {
    10
}
fn default_album_search_limit() -> u32 {
    50
}
fn default_bucket_total_gb() -> f64 {
    15.0
}
fn default_bucket_emergency_gb() -> f64 {
    14.0
}
fn default_per_tenant_gb() -> f64 {
    2.0
}
fn default_user_per_minute() -> u32 {
    20
}
fn default_channel_per_minute() -> u32 {
    10
}
fn default_global_per_minute() -> u32 {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_s() -> u64 {
    1
}
fn default_max_backoff_s() -> u64 {
    60
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_post_expires_days() -> i64 {
    30
}
fn default_vision_max_deliveries() -> u32 {
    3
}
fn default_vision_idempotency_ttl_h() -> u64 {
    24
}
fn default_vision_daily_token_budget() -> u64 {
    200_000
}
fn default_vision_tokens_per_image() -> u64 {
    800
}
fn default_vision_allow_ocr_fallback() -> bool {
    true
}
fn default_indexing_concurrency() -> usize {
    4
}
fn default_embedding_dim() -> u32 {
    1536
}
fn default_embedding_provider() -> String {
    "http-embedding".to_string()
}
fn default_max_pool_size() -> u32 {
    16
}
fn default_crawl_tag_patterns() -> Vec<String> {
    vec![
        "longread".to_string(),
        "research".to_string(),
        "paper".to_string(),
        "release".to_string(),
    ]
}
fn default_crawl_timeout_s() -> u64 {
    10
}
fn default_crawl_max_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_crawl_user_agent() -> String {
    "ingestd-crawler/1.0".to_string()
}
fn default_remove_trailing_slash() -> bool {
    true
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_neo4j_url() -> String {
    "bolt://localhost:7687".to_string()
}
fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

impl IngestConfig {
    /// Load config from a TOML file with INGEST_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: IngestConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("INGEST_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ingestd/ingest.toml", home)
}
