use ingest_events::VisionResult;

use crate::error::{Result, VisionError};

const MAX_LABELS: usize = 20;
const MAX_OBJECTS: usize = 10;
const MAX_DOMINANT_COLORS: usize = 5;
const MIN_DESCRIPTION_LEN: usize = 5;

/// Normalizes and strictly validates a raw provider result before it is
/// allowed downstream (embeddings, Qdrant, Neo4j): labels are lower-cased,
/// trimmed, and truncated; description has a minimum length; scores (when
/// present) must lie in `[0, 1]`.
pub fn normalize_and_validate(mut result: VisionResult) -> Result<VisionResult> {
    result.description = result.description.trim().to_string();
    if result.description.chars().count() < MIN_DESCRIPTION_LEN {
        return Err(VisionError::SchemaInvalid("description shorter than 5 characters".to_string()));
    }

    result.labels = result
        .labels
        .into_iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .take(MAX_LABELS)
        .collect();

    result.objects = result
        .objects
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .take(MAX_OBJECTS)
        .collect();

    result.dominant_colors = result.dominant_colors.into_iter().take(MAX_DOMINANT_COLORS).collect();

    for (name, score) in [("nsfw_score", result.nsfw_score), ("aesthetic_score", result.aesthetic_score)] {
        if let Some(v) = score {
            if !(0.0..=1.0).contains(&v) {
                return Err(VisionError::SchemaInvalid(format!("{name} out of [0,1] range: {v}")));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VisionResult {
        VisionResult {
            classification: "photo".to_string(),
            description: "A cat sitting on a windowsill".to_string(),
            labels: vec![],
            objects: vec![],
            is_meme: false,
            ocr_text: None,
            nsfw_score: None,
            aesthetic_score: None,
            dominant_colors: vec![],
        }
    }

    #[test]
    fn rejects_too_short_description() {
        let mut r = sample();
        r.description = "hi".to_string();
        assert!(normalize_and_validate(r).is_err());
    }

    #[test]
    fn truncates_labels_to_twenty() {
        let mut r = sample();
        r.labels = (0..30).map(|i| format!("Label{i}")).collect();
        let validated = normalize_and_validate(r).unwrap();
        assert_eq!(validated.labels.len(), MAX_LABELS);
        assert_eq!(validated.labels[0], "label0");
    }

    #[test]
    fn rejects_out_of_range_score() {
        let mut r = sample();
        r.nsfw_score = Some(1.5);
        assert!(normalize_and_validate(r).is_err());
    }

    #[test]
    fn accepts_well_formed_result() {
        let r = sample();
        assert!(normalize_and_validate(r).is_ok());
    }
}
