use async_trait::async_trait;

use crate::error::Result;

/// Context carried alongside the post text: facets already known (e.g. prior
/// vision labels on a retag) that the prompt should account for.
#[derive(Debug, Clone, Default)]
pub struct TaggingContext {
    pub facets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TaggingOutcome {
    pub tags: Vec<String>,
    pub topics: Vec<String>,
    pub provider: String,
    pub tokens_used: u32,
    pub latency_ms: u64,
}

/// Seam over the AI tagging provider. Kept deliberately narrow — a strict
/// prompt in, a bounded tag list out — so the stage logic never depends on a
/// specific vendor SDK.
#[async_trait]
pub trait AiTaggingAdapter: Send + Sync {
    async fn tag(&self, text: &str, context: &TaggingContext) -> Result<TaggingOutcome>;
}

/// Lower-cases, trims, de-duplicates, and drops empties — the normalisation
/// step between the adapter's raw output and what gets hashed/persisted.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let normalized = tag.trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_tags_dedupes_case_insensitively_and_trims() {
        let tags = normalize_tags(vec![" Rust ".into(), "rust".into(), "".into(), "WASM".into()]);
        assert_eq!(tags, vec!["rust".to_string(), "wasm".to_string()]);
    }
}
