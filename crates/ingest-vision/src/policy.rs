use ingest_events::MediaFileRef;
use ingest_media::mime::is_vision_eligible;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow(Vec<MediaFileRef>),
    Deny(&'static str),
}

/// Filters a post's media down to vision-eligible attachments; denies with
/// a skip reason when there is nothing left to analyze.
pub fn evaluate(media_files: &[MediaFileRef], requires_vision: bool) -> PolicyDecision {
    if !requires_vision {
        return PolicyDecision::Deny("not_required");
    }
    if media_files.is_empty() {
        return PolicyDecision::Deny("no_media");
    }
    let eligible: Vec<MediaFileRef> = media_files.iter().filter(|m| is_vision_eligible(&m.mime_type)).cloned().collect();
    if eligible.is_empty() {
        return PolicyDecision::Deny("mime_mismatch");
    }
    PolicyDecision::Allow(eligible)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(mime: &str) -> MediaFileRef {
        MediaFileRef { sha256: "a".repeat(64), s3_key: "k".to_string(), mime_type: mime.to_string(), size_bytes: 10 }
    }

    #[test]
    fn denies_when_vision_not_required() {
        assert_eq!(evaluate(&[media("image/jpeg")], false), PolicyDecision::Deny("not_required"));
    }

    #[test]
    fn denies_on_empty_media() {
        assert_eq!(evaluate(&[], true), PolicyDecision::Deny("no_media"));
    }

    #[test]
    fn denies_when_nothing_is_vision_eligible() {
        assert_eq!(evaluate(&[media("application/pdf")], true), PolicyDecision::Deny("mime_mismatch"));
    }

    #[test]
    fn allows_and_filters_to_eligible_media() {
        let files = vec![media("application/pdf"), media("image/png")];
        match evaluate(&files, true) {
            PolicyDecision::Allow(eligible) => assert_eq!(eligible.len(), 1),
            other => panic!("expected Allow, got {other:?}"),
        }
    }
}
