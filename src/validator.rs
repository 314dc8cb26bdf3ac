//! Structural validation of a provider's diagnosis payload.

use crate::types::DiagnosisResult;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("empty response body")]
    Empty,

    #[error("response is not a valid diagnosis object: {0}")]
    Malformed(String),

    #[error("diseaseName must be a non-empty string")]
    MissingDiseaseName,

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Parse and validate the JSON text a provider returned.
///
/// `severity` must match one of `Low`, `Medium`, `High`, `Healthy` exactly and
/// every list field must hold strings only. Extra fields are ignored.
pub fn validate(raw: &str) -> Result<DiagnosisResult, ValidationError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    // serde would otherwise accept a positional array for the struct
    if !value.is_object() {
        return Err(ValidationError::Malformed("expected a JSON object".to_string()));
    }
    let result: DiagnosisResult =
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    if result.disease_name.trim().is_empty() {
        return Err(ValidationError::MissingDiseaseName);
    }

    if let Some(confidence) = result.confidence {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }
    }

    // The crop annotation belongs to degraded results only
    Ok(DiagnosisResult { crop: None, ..result })
}

/// Some models still wrap JSON mode output in a Markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "diseaseName": "Late Blight",
            "confidence": 0.92,
            "severity": "High",
            "description": "Dark water-soaked lesions on leaves.",
            "treatment": ["Remove infected leaves"],
            "organicAlternatives": ["Neem oil"],
            "prevention": ["Rotate crops"],
            "nextSteps": "Spray within 24 hours.",
            "products": []
        })
    }

    #[test]
    fn test_valid_payload() {
        let result = validate(&payload().to_string()).unwrap();
        assert_eq!(result.disease_name, "Late Blight");
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.confidence, Some(0.92));
        assert!(result.products.is_empty());
    }

    #[test]
    fn test_missing_disease_name_rejected() {
        let mut value = payload();
        value.as_object_mut().unwrap().remove("diseaseName");
        assert!(matches!(
            validate(&value.to_string()),
            Err(ValidationError::Malformed(_))
        ));

        let mut value = payload();
        value["diseaseName"] = serde_json::json!("  ");
        assert_eq!(
            validate(&value.to_string()),
            Err(ValidationError::MissingDiseaseName)
        );
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let mut value = payload();
        value["severity"] = serde_json::json!("Critical");
        assert!(validate(&value.to_string()).is_err());

        // Case-sensitive
        value["severity"] = serde_json::json!("high");
        assert!(validate(&value.to_string()).is_err());
    }

    #[test]
    fn test_type_mismatches_rejected() {
        let mut value = payload();
        value["confidence"] = serde_json::json!("0.9");
        assert!(validate(&value.to_string()).is_err());

        let mut value = payload();
        value["treatment"] = serde_json::json!([1, 2]);
        assert!(validate(&value.to_string()).is_err());

        let mut value = payload();
        value["nextSteps"] = serde_json::json!(["a"]);
        assert!(validate(&value.to_string()).is_err());
    }

    #[test]
    fn test_confidence_optional_but_bounded() {
        let mut value = payload();
        value.as_object_mut().unwrap().remove("confidence");
        assert_eq!(validate(&value.to_string()).unwrap().confidence, None);

        value["confidence"] = serde_json::Value::Null;
        assert_eq!(validate(&value.to_string()).unwrap().confidence, None);

        value["confidence"] = serde_json::json!(95);
        assert_eq!(
            validate(&value.to_string()),
            Err(ValidationError::ConfidenceOutOfRange(95.0))
        );
    }

    #[test]
    fn test_empty_and_non_json_rejected() {
        assert_eq!(validate("   "), Err(ValidationError::Empty));
        assert!(matches!(
            validate("The leaf looks sick."),
            Err(ValidationError::Malformed(_))
        ));
        assert!(validate("[]").is_err());
    }

    #[test]
    fn test_fenced_json_accepted() {
        let fenced = format!("```json\n{}\n```", payload());
        assert_eq!(validate(&fenced).unwrap().disease_name, "Late Blight");
    }

    #[test]
    fn test_extra_fields_ignored_and_crop_dropped() {
        let mut value = payload();
        value["crop"] = serde_json::json!("Potato");
        value["model"] = serde_json::json!("x");
        assert_eq!(validate(&value.to_string()).unwrap().crop, None);
    }
}
