pub mod canonicalize;
pub mod crawler;
pub mod error;
pub mod policy;
pub mod stage;

pub use canonicalize::{canonicalize_url, hash_canonical_url};
pub use crawler::{fetch, CrawledPage};
pub use error::{EnrichmentError, Result};
pub use policy::{first_url, tags_match_crawl_policy};
pub use stage::EnrichmentStage;
