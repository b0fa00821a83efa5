/// Decides whether a tagged post is eligible for crawling: at least one tag
/// must contain (case-insensitive) one of the configured patterns.
pub fn tags_match_crawl_policy(tags: &[String], patterns: &[String]) -> bool {
    tags.iter().any(|tag| {
        let lower = tag.to_lowercase();
        patterns.iter().any(|p| lower.contains(&p.to_lowercase()))
    })
}

/// Picks the first URL in a post's URL list, if any.
pub fn first_url(urls: &[String]) -> Option<&str> {
    urls.first().map(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec![
            "longread".to_string(),
            "research".to_string(),
            "paper".to_string(),
            "release".to_string(),
        ]
    }

    #[test]
    fn matches_on_substring_case_insensitive() {
        assert!(tags_match_crawl_policy(&["LongRead".to_string()], &patterns()));
        assert!(tags_match_crawl_policy(&["research-notes".to_string()], &patterns()));
    }

    #[test]
    fn no_match_when_no_tag_contains_a_pattern() {
        assert!(!tags_match_crawl_policy(&["meme".to_string(), "chat".to_string()], &patterns()));
    }

    #[test]
    fn first_url_returns_none_for_empty_list() {
        assert_eq!(first_url(&[]), None);
    }
}
