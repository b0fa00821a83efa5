//! Content-addressed key layout (spec §3).

/// `media/{tenant}/{sha[:2]}/{sha}.{ext}`
pub fn media_key(tenant: &str, sha256: &str, ext: &str) -> String {
    format!("media/{tenant}/{}/{sha256}.{ext}", &sha256[..2])
}

/// `vision/{tenant}/{sha}/{provider}_{model}_{schemaver}.json[.gz]`
pub fn vision_key(tenant: &str, sha256: &str, provider: &str, model: &str, schema_ver: &str, gz: bool) -> String {
    let suffix = if gz { ".json.gz" } else { ".json" };
    format!("vision/{tenant}/{sha256}/{provider}_{model}_{schema_ver}{suffix}")
}

/// `crawl/{tenant}/{urlhash[:16]}.(html|md).gz`
pub fn crawl_key(tenant: &str, url_hash: &str, ext: &str) -> String {
    format!("crawl/{tenant}/{}.{ext}.gz", &url_hash[..16])
}

/// `album/{tenant}/{album_id}_vision_summary_v1.json[.gz]`
pub fn album_summary_key(tenant: &str, album_id: &str, gz: bool) -> String {
    let suffix = if gz { ".json.gz" } else { ".json" };
    format!("album/{tenant}/{album_id}_vision_summary_v1{suffix}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Media,
    Vision,
    Crawl,
    Album,
}

impl ContentType {
    /// Eviction priority ordering: `crawl > vision > media` (album summaries
    /// are never eviction candidates). Lower number evicts first.
    pub fn eviction_priority(self) -> u8 {
        match self {
            ContentType::Crawl => 0,
            ContentType::Vision => 1,
            ContentType::Media => 2,
            ContentType::Album => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_key_shards_by_prefix() {
        let k = media_key("t1", "abcdef0123", "jpg");
        assert_eq!(k, "media/t1/ab/abcdef0123.jpg");
    }

    #[test]
    fn eviction_priority_orders_crawl_before_vision_before_media() {
        assert!(ContentType::Crawl.eviction_priority() < ContentType::Vision.eviction_priority());
        assert!(ContentType::Vision.eviction_priority() < ContentType::Media.eviction_priority());
    }
}
