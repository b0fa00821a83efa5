use serde::{Deserialize, Serialize};

/// What the retag stage stamps onto the `tags` enrichment row's `metadata`
/// after a successful (re)tag, so the next `posts.vision.analyzed` delivery
/// for the same post can tell whether it has already been accounted for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsMetadata {
    pub vision_version: Option<String>,
    pub features_hash: Option<String>,
}

/// Per spec §4.13: retag iff the incoming `vision_version` is strictly
/// greater than the stored one, the `features_hash` differs, or the stored
/// row carries no version at all (a legacy pre-vision tagging pass).
pub fn should_retag(stored: &TagsMetadata, incoming_vision_version: Option<&str>, incoming_features_hash: &str) -> bool {
    match &stored.vision_version {
        None => true,
        Some(stored_version) => {
            if stored.features_hash.as_deref() != Some(incoming_features_hash) {
                return true;
            }
            match incoming_vision_version {
                Some(incoming) => incoming > stored_version.as_str(),
                None => false,
            }
        }
    }
}

pub fn parse_metadata(raw: &serde_json::Value) -> TagsMetadata {
    serde_json::from_value(raw.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_row_with_no_version_always_retags() {
        let stored = TagsMetadata::default();
        assert!(should_retag(&stored, Some("v1"), "abc"));
    }

    #[test]
    fn advancing_version_retags() {
        let stored = TagsMetadata { vision_version: Some("v1".to_string()), features_hash: Some("abc".to_string()) };
        assert!(should_retag(&stored, Some("v2"), "abc"));
    }

    #[test]
    fn differing_features_hash_retags_even_at_same_version() {
        let stored = TagsMetadata { vision_version: Some("v1".to_string()), features_hash: Some("abc".to_string()) };
        assert!(should_retag(&stored, Some("v1"), "xyz"));
    }

    #[test]
    fn same_version_and_hash_does_not_retag() {
        let stored = TagsMetadata { vision_version: Some("v1".to_string()), features_hash: Some("abc".to_string()) };
        assert!(!should_retag(&stored, Some("v1"), "abc"));
    }

    #[test]
    fn older_incoming_version_does_not_retag() {
        let stored = TagsMetadata { vision_version: Some("v2".to_string()), features_hash: Some("abc".to_string()) };
        assert!(!should_retag(&stored, Some("v1"), "abc"));
    }

    #[test]
    fn parse_metadata_defaults_on_malformed_json() {
        let parsed = parse_metadata(&serde_json::json!({"unexpected": true}));
        assert!(parsed.vision_version.is_none());
    }
}
