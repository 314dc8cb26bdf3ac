//! Provider-agnostic diagnostic prompt.

use crate::types::EdgeHint;

/// Context lines describing what is already known about the photograph.
pub fn build_context(crop_hint: Option<&str>, edge_hint: Option<&EdgeHint>) -> String {
    let mut context = match crop_hint {
        Some(crop) => format!("The crop is {}.", crop),
        None => "Identify the crop first.".to_string(),
    };

    if let Some(hint) = edge_hint {
        context.push_str(&format!(
            " Edge identification: '{}' on {} ({} confidence).",
            hint.disease_label,
            hint.crop_label,
            hint.severity_bucket.as_str()
        ));
    }

    context
}

/// Full instruction prompt sent alongside the image to every provider.
pub fn build_prompt(context: &str) -> String {
    format!(
        r#"ROLE: Expert Agricultural Scientist & Plant Pathologist.
CONTEXT: {context}

TASK: Analyze the image for disease, pests, or nutrient deficiencies.
OUTPUT FORMAT: Provide a diagnosis and actionable advice as a single JSON object.

STRICT JSON STRUCTURE:
{{
    "diseaseName": "Final diagnosis or 'Healthy <Crop>'",
    "confidence": 0.95,
    "severity": "Low" | "Medium" | "High" | "Healthy",
    "description": "Short summary of symptoms found.",
    "treatment": ["Immediate chemical/physical action step 1", "step 2"],
    "organicAlternatives": ["Natural/organic remedy step 1"],
    "prevention": ["Long-term prevention strategy"],
    "nextSteps": "The single most important next action for the farmer.",
    "products": []
}}

INSTRUCTIONS:
- If the plant is healthy, set severity to "Healthy".
- Treatments must be relevant to local smallholder agriculture.
- Return ONLY the JSON object. No conversation. No markdown blocks."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_without_hints() {
        assert_eq!(build_context(None, None), "Identify the crop first.");
    }

    #[test]
    fn test_context_with_crop_and_edge_hint() {
        let hint = EdgeHint::from_label("Tomato___Late_blight", 0.91);
        let context = build_context(Some("Tomato"), Some(&hint));

        assert!(context.starts_with("The crop is Tomato."));
        assert!(context.contains("Edge identification: 'Late blight' on Tomato (high confidence)."));
    }

    #[test]
    fn test_prompt_embeds_context_and_schema() {
        let prompt = build_prompt("The crop is Rice.");
        assert!(prompt.contains("CONTEXT: The crop is Rice."));
        assert!(prompt.contains("\"organicAlternatives\""));
        assert!(prompt.contains("\"severity\": \"Low\" | \"Medium\" | \"High\" | \"Healthy\""));
    }
}
