use sha2::{Digest, Sha256};

/// SHA-256 of normalised message text. Normalisation collapses internal
/// whitespace so cosmetic edits do not change the hash.
pub fn content_hash(text: &str) -> String {
    let normalised = normalise_whitespace(text);
    hex::encode(Sha256::digest(normalised.as_bytes()))
}

/// Hash over the sorted, de-duplicated, non-empty tag set. Order and
/// duplicates in the input must not change the result (testable property 6).
pub fn tags_hash(tags: &[String]) -> String {
    let mut set: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    set.sort();
    set.dedup();
    hex::encode(Sha256::digest(set.join(",").as_bytes()))
}

/// Hash over the vision input features (mime list + byte sizes + sha list),
/// used to detect semantic change across re-runs without re-downloading blobs.
pub fn features_hash(shas: &[String], mimes: &[String]) -> String {
    let mut parts: Vec<String> = shas
        .iter()
        .zip(mimes.iter())
        .map(|(s, m)| format!("{s}:{m}"))
        .collect();
    parts.sort();
    hex::encode(Sha256::digest(parts.join("|").as_bytes()))
}

fn normalise_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_hash_ignores_order_and_case_and_dupes() {
        let a = tags_hash(&["Rust".into(), "wasm".into(), "rust".into()]);
        let b = tags_hash(&["wasm".into(), "rust".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_ignores_extra_whitespace() {
        let a = content_hash("hello   world");
        let b = content_hash("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_changes_with_text() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
