use chrono::{DateTime, Duration, Utc};
use neo4rs::{query, Graph};
use sha2::Digest;
use uuid::Uuid;

use crate::error::Result;

/// Everything the graph write needs about one post, gathered by the stage
/// before calling [`write_post`]. Kept as plain fields rather than reusing
/// `PostForIndexing` directly so this module has no dependency on `ingest_db`
/// beyond what it actually touches.
#[derive(Debug, Clone)]
pub struct PostGraphInput<'a> {
    pub post_id: Uuid,
    pub tenant_id: &'a str,
    pub channel_id: Uuid,
    pub channel_title: Option<&'a str>,
    pub posted_at: DateTime<Utc>,
    pub tags: &'a [String],
    pub topics: &'a [String],
    pub media_shas: &'a [(String, Option<String>)],
    pub crawl_url: Option<&'a str>,
    pub ocr_entities: &'a [String],
    pub album_id: Option<Uuid>,
    pub post_expires_days: i64,
}

/// Count of nodes/relationships this write attempted, for the
/// `posts.indexed` event's graph counters. Approximate: a `MERGE` that
/// matches an existing node still counts here, since Neo4j's driver doesn't
/// surface created-vs-matched counts without a second round trip this stage
/// doesn't need.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphWriteCounts {
    pub nodes: u32,
    pub relationships: u32,
}

/// Writes (MERGEs) the `Post` node and every relationship spec §4.12 names:
/// `Channel`, one `Tag`+`Topic` pair per tag, one `ImageContent` per media
/// sha, one `WebPage` per crawled URL, and `Entity` nodes parsed from OCR.
pub async fn write_post(graph: &Graph, input: &PostGraphInput<'_>) -> Result<GraphWriteCounts> {
    let mut counts = GraphWriteCounts::default();
    let expires_at = input.posted_at + Duration::days(input.post_expires_days);

    graph
        .run(
            query(
                "MERGE (p:Post {id: $id})
                 SET p.tenant_id = $tenant_id, p.posted_at = $posted_at, p.expires_at = $expires_at",
            )
            .param("id", input.post_id.to_string())
            .param("tenant_id", input.tenant_id)
            .param("posted_at", input.posted_at.to_rfc3339())
            .param("expires_at", expires_at.to_rfc3339()),
        )
        .await?;
    counts.nodes += 1;

    graph
        .run(
            query(
                "MATCH (p:Post {id: $post_id})
                 MERGE (c:Channel {id: $channel_id})
                 SET c.title = coalesce($title, c.title)
                 MERGE (p)-[:POSTED_IN]->(c)",
            )
            .param("post_id", input.post_id.to_string())
            .param("channel_id", input.channel_id.to_string())
            .param("title", input.channel_title.unwrap_or_default()),
        )
        .await?;
    counts.nodes += 1;
    counts.relationships += 1;

    for tag in input.tags {
        graph
            .run(
                query(
                    "MATCH (p:Post {id: $post_id})
                     MERGE (t:Tag {name: $tag})
                     MERGE (topic:Topic {name: $tag})
                     MERGE (p)-[:TAGGED]->(t)
                     MERGE (t)-[:OF_TOPIC]->(topic)",
                )
                .param("post_id", input.post_id.to_string())
                .param("tag", tag.as_str()),
            )
            .await?;
        counts.nodes += 2;
        counts.relationships += 2;
    }
    let _ = input.topics;

    for (sha, mime) in input.media_shas {
        graph
            .run(
                query(
                    "MATCH (p:Post {id: $post_id})
                     MERGE (img:ImageContent {sha256: $sha})
                     SET img.mime_type = coalesce($mime, img.mime_type)
                     MERGE (p)-[:HAS_IMAGE]->(img)",
                )
                .param("post_id", input.post_id.to_string())
                .param("sha", sha.as_str())
                .param("mime", mime.clone().unwrap_or_default()),
            )
            .await?;
        counts.nodes += 1;
        counts.relationships += 1;
    }

    if let Some(url) = input.crawl_url {
        let url_hash = hex::encode(sha2::Sha256::digest(url.as_bytes()));
        graph
            .run(
                query(
                    "MATCH (p:Post {id: $post_id})
                     MERGE (w:WebPage {url_hash: $url_hash})
                     SET w.url = $url
                     MERGE (p)-[:REFERENCES]->(w)",
                )
                .param("post_id", input.post_id.to_string())
                .param("url_hash", url_hash)
                .param("url", url),
            )
            .await?;
        counts.nodes += 1;
        counts.relationships += 1;
    }

    for entity in input.ocr_entities {
        graph
            .run(
                query(
                    "MATCH (p:Post {id: $post_id})
                     MERGE (e:Entity {name: $name})
                     MERGE (p)-[:MENTIONS]->(e)",
                )
                .param("post_id", input.post_id.to_string())
                .param("name", entity.as_str()),
            )
            .await?;
        counts.nodes += 1;
        counts.relationships += 1;
    }

    if let Some(album_id) = input.album_id {
        graph
            .run(
                query(
                    "MATCH (p:Post {id: $post_id})
                     MERGE (a:Album {id: $album_id})
                     MERGE (p)-[:PART_OF]->(a)",
                )
                .param("post_id", input.post_id.to_string())
                .param("album_id", album_id.to_string()),
            )
            .await?;
        counts.nodes += 1;
        counts.relationships += 1;
    }

    Ok(counts)
}

/// Best-effort entity extraction from OCR text: capitalised multi-word runs
/// (a crude proper-noun heuristic), deduplicated and capped. Spec §4.12
/// names `Entity` nodes "parsed from OCR" without specifying an NER model;
/// this keeps the graph populated without a second AI dependency.
pub fn extract_entities(ocr_text: &str) -> Vec<String> {
    const MAX_ENTITIES: usize = 10;
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for word in ocr_text.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
        if trimmed.chars().count() < 3 {
            continue;
        }
        let mut chars = trimmed.chars();
        let is_capitalized = chars.next().map(|c| c.is_uppercase()).unwrap_or(false);
        if !is_capitalized {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
        if out.len() >= MAX_ENTITIES {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_entities_keeps_capitalised_words_only() {
        let entities = extract_entities("visit Paris and london this Summer");
        assert!(entities.contains(&"Paris".to_string()));
        assert!(entities.contains(&"Summer".to_string()));
        assert!(!entities.contains(&"london".to_string()));
    }

    #[test]
    fn extract_entities_deduplicates_case_insensitively() {
        let entities = extract_entities("Rust rust RUST");
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn extract_entities_caps_at_ten() {
        let text: String = (0..30).map(|i| format!("Word{i} ")).collect();
        let entities = extract_entities(&text);
        assert_eq!(entities.len(), 10);
    }
}
