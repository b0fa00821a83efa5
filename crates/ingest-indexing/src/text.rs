use ingest_db::types::PostForIndexing;

const POST_TEXT_CAP: usize = 2000;
const VISION_DESC_CAP: usize = 500;
const VISION_OCR_CAP: usize = 300;
const CRAWL_EXCERPT_CAP: usize = 1500;
const CRAWL_OCR_CAP: usize = 300;

fn normalise(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cap(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Composes the embedding input from a post and its enrichments, in
/// priority order, each part capped then normalised (whitespace/newlines
/// collapsed), with case-insensitive de-duplication across parts.
///
/// Returns `None` when every source is empty, which callers must translate
/// into `embedding_status = skipped` with reason `empty`.
pub fn compose_embedding_text(post: &PostForIndexing, crawl_excerpt: Option<&str>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut seen_lower: Vec<String> = Vec::new();

    let mut push = |raw: &str, max_chars: usize, parts: &mut Vec<String>, seen: &mut Vec<String>| {
        let normalised = normalise(&cap(raw, max_chars));
        if normalised.is_empty() {
            return;
        }
        let key = normalised.to_lowercase();
        if seen.contains(&key) {
            return;
        }
        seen.push(key);
        parts.push(normalised);
    };

    if let Some(text) = post.text.as_deref() {
        push(text, POST_TEXT_CAP, &mut parts, &mut seen_lower);
    }

    if let Some(vision) = &post.vision_payload {
        if let Some(desc) = vision.get("description").and_then(|v| v.as_str()) {
            push(desc, VISION_DESC_CAP, &mut parts, &mut seen_lower);
        }
        let ocr = vision
            .get("text_enhanced")
            .and_then(|v| v.as_str())
            .or_else(|| vision.get("ocr_text").and_then(|v| v.as_str()));
        if let Some(ocr) = ocr {
            push(ocr, VISION_OCR_CAP, &mut parts, &mut seen_lower);
        }
    }

    if let Some(excerpt) = crawl_excerpt {
        push(excerpt, CRAWL_EXCERPT_CAP, &mut parts, &mut seen_lower);
    }

    if let Some(crawl) = &post.crawl_payload {
        if let Some(ocr) = crawl.get("ocr_text").and_then(|v| v.as_str()) {
            push(ocr, CRAWL_OCR_CAP, &mut parts, &mut seen_lower);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn empty_post(text: Option<&str>) -> PostForIndexing {
        PostForIndexing {
            id: Uuid::nil(),
            tenant_id: "t1".to_string(),
            channel_id: Uuid::nil(),
            channel_tenant_id: "t1".to_string(),
            channel_title: None,
            text: text.map(|t| t.to_string()),
            posted_at: Utc::now(),
            is_processed: false,
            tags_payload: None,
            vision_payload: None,
            crawl_payload: None,
        }
    }

    #[test]
    fn all_sources_empty_yields_none() {
        let post = empty_post(None);
        assert!(compose_embedding_text(&post, None).is_none());
    }

    #[test]
    fn post_text_alone_is_normalised() {
        let post = empty_post(Some("hello   world\n\nagain"));
        let composed = compose_embedding_text(&post, None).unwrap();
        assert_eq!(composed, "hello world again");
    }

    #[test]
    fn caps_are_applied_per_part() {
        let long = "a".repeat(5000);
        let post = empty_post(Some(&long));
        let composed = compose_embedding_text(&post, None).unwrap();
        assert_eq!(composed.chars().count(), POST_TEXT_CAP);
    }

    #[test]
    fn duplicate_parts_are_dropped_case_insensitively() {
        let mut post = empty_post(Some("Breaking News"));
        post.vision_payload = Some(serde_json::json!({ "description": "breaking news" }));
        let composed = compose_embedding_text(&post, None).unwrap();
        assert_eq!(composed, "Breaking News");
    }

    #[test]
    fn vision_and_crawl_parts_are_concatenated_in_priority_order() {
        let mut post = empty_post(Some("post body"));
        post.vision_payload = Some(serde_json::json!({ "description": "a photo of a cat", "ocr_text": "store hours 9-5" }));
        let composed = compose_embedding_text(&post, Some("excerpt from the article")).unwrap();
        assert_eq!(composed, "post body\n\na photo of a cat\n\nstore hours 9-5\n\nexcerpt from the article");
    }
}
