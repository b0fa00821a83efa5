/// MIME types eligible for vision analysis (C10). Documents and video are
/// downloaded and stored, but only these kinds get handed to the vision
/// pipeline.
const VISION_ELIGIBLE_PREFIXES: &[&str] = &["image/"];
const VISION_ELIGIBLE_EXACT: &[&str] = &["image/gif"];

pub fn is_vision_eligible(mime_type: &str) -> bool {
    VISION_ELIGIBLE_PREFIXES.iter().any(|p| mime_type.starts_with(p))
        || VISION_ELIGIBLE_EXACT.contains(&mime_type)
}

/// File extension for the CAS key, derived from the MIME type the platform
/// reported. Falls back to `bin` for anything unrecognised rather than
/// failing the upload.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_vision_eligible_documents_are_not() {
        assert!(is_vision_eligible("image/jpeg"));
        assert!(!is_vision_eligible("application/pdf"));
        assert!(!is_vision_eligible("video/mp4"));
    }
}
