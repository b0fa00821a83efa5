use sha2::{Digest, Sha256};
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "source",
    "campaign",
];

/// Canonicalizes a URL for crawl dedup: lower-case scheme/host, drop a
/// default port, drop the fragment, strip tracking params (substring match
/// against [`TRACKING_PARAMS`]), sort the remaining query keys, and
/// optionally strip a trailing slash. Fails open: a URL that doesn't parse
/// is returned unchanged rather than rejected.
pub fn canonicalize_url(raw: &str, remove_trailing_slash: bool) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    let scheme = parsed.scheme().to_lowercase();
    if parsed.set_scheme(&scheme).is_err() {
        return raw.to_string();
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        if parsed.set_host(Some(&host)).is_err() {
            return raw.to_string();
        }
    }

    let default_port = match scheme.as_str() {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    };
    if parsed.port() == default_port {
        let _ = parsed.set_port(None);
    }

    if remove_trailing_slash && parsed.path().len() > 1 && parsed.path().ends_with('/') {
        let trimmed = parsed.path().trim_end_matches('/').to_string();
        parsed.set_path(&trimmed);
    }

    let mut kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let lower = k.to_lowercase();
            !TRACKING_PARAMS.iter().any(|tp| lower.contains(tp))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| format!("{}={}", url_encode(k), url_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    parsed.set_fragment(None);
    parsed.to_string()
}

fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub fn hash_canonical_url(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host_and_drops_default_port() {
        let url = canonicalize_url("HTTPS://Example.COM:443/Path", true);
        assert_eq!(url, "https://example.com/Path");
    }

    #[test]
    fn strips_tracking_params_and_sorts_the_rest() {
        let url = canonicalize_url(
            "https://example.com/a?utm_source=x&b=2&a=1&fbclid=abc",
            true,
        );
        assert_eq!(url, "https://example.com/a?a=1&b=2");
    }

    #[test]
    fn drops_fragment_always() {
        let url = canonicalize_url("https://example.com/a#section", true);
        assert_eq!(url, "https://example.com/a");
    }

    #[test]
    fn strips_trailing_slash_when_configured() {
        let url = canonicalize_url("https://example.com/a/", true);
        assert_eq!(url, "https://example.com/a");
        let kept = canonicalize_url("https://example.com/a/", false);
        assert_eq!(kept, "https://example.com/a/");
    }

    #[test]
    fn root_path_trailing_slash_is_kept() {
        let url = canonicalize_url("https://example.com/", true);
        assert_eq!(url, "https://example.com/");
    }

    #[test]
    fn fails_open_on_unparseable_url() {
        let url = canonicalize_url("not a url at all", true);
        assert_eq!(url, "not a url at all");
    }

    #[test]
    fn hash_is_stable_for_identical_canonical_urls() {
        let a = hash_canonical_url("https://example.com/a");
        let b = hash_canonical_url("https://example.com/a");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
