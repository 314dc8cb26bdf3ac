//! Request-scoped data model shared by the diagnosis pipeline.
//!
//! Everything here is created and dropped within a single request. The only
//! process-wide values are the cascade configuration and the loaded edge
//! model, which live in their own modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Input
// ============================================================================

/// Raw photograph plus the farmer's optional crop hint.
#[derive(Debug, Clone)]
pub struct ImageInput {
    bytes: Arc<[u8]>,
    crop_hint: Option<String>,
}

impl ImageInput {
    pub fn new(bytes: impl Into<Arc<[u8]>>, crop_hint: Option<String>) -> Self {
        // A blank hint carries no information
        let crop_hint = crop_hint
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Self {
            bytes: bytes.into(),
            crop_hint,
        }
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn crop_hint(&self) -> Option<&str> {
        self.crop_hint.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Severity reported to the farmer. Serialized with the exact casing below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Healthy,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Healthy => "Healthy",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse bucket of the edge classifier's top-class score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    /// High above 0.8, Medium above 0.5, Low otherwise.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.8 {
            ConfidenceBucket::High
        } else if confidence > 0.5 {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBucket::High => "high",
            ConfidenceBucket::Medium => "medium",
            ConfidenceBucket::Low => "low",
        }
    }
}

impl From<ConfidenceBucket> for Severity {
    fn from(bucket: ConfidenceBucket) -> Self {
        match bucket {
            ConfidenceBucket::High => Severity::High,
            ConfidenceBucket::Medium => Severity::Medium,
            ConfidenceBucket::Low => Severity::Low,
        }
    }
}

// ============================================================================
// Edge hint
// ============================================================================

/// Local classifier's best guess, used as prompt context and as the seed of
/// a degraded result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeHint {
    pub disease_label: String,
    pub crop_label: String,
    /// Top-class score in `[0, 1]`
    pub confidence: f32,
    pub severity_bucket: ConfidenceBucket,
}

impl EdgeHint {
    /// Build a hint from a compound class label such as `Tomato___Late_blight`.
    pub fn from_label(label: &str, confidence: f32) -> Self {
        let (crop_label, disease_label) = split_label(label);
        let confidence = round4(confidence.clamp(0.0, 1.0));

        Self {
            disease_label,
            crop_label,
            confidence,
            severity_bucket: ConfidenceBucket::from_confidence(confidence),
        }
    }
}

/// Split `Crop___Disease_name` into (`Crop`, `Disease name`).
fn split_label(label: &str) -> (String, String) {
    match label.split_once("___") {
        Some((crop, disease)) => (crop.replace('_', " "), disease.replace('_', " ")),
        None => ("Unknown".to_string(), label.replace('_', " ")),
    }
}

fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

// ============================================================================
// Diagnosis result
// ============================================================================

/// Canonical diagnosis returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub disease_name: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub severity: Severity,
    pub description: String,
    pub treatment: Vec<String>,
    pub organic_alternatives: Vec<String>,
    pub prevention: Vec<String>,
    pub next_steps: String,
    pub products: Vec<String>,
    /// Only set on degraded results, from the edge classifier's crop label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
}

// ============================================================================
// Cascade attempts
// ============================================================================

/// Outcome of one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    TransportError,
    Timeout,
    InvalidResponse,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::TransportError => "transport_error",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one cascade step, kept only to explain a failed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider_id: String,
    pub outcome: AttemptOutcome,
    pub error_detail: Option<String>,
}

impl ProviderAttempt {
    pub fn failure(
        provider_id: impl Into<String>,
        outcome: AttemptOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            outcome,
            error_detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_label_split() {
        let hint = EdgeHint::from_label("Tomato___Late_blight", 0.91);
        assert_eq!(hint.crop_label, "Tomato");
        assert_eq!(hint.disease_label, "Late blight");
        assert_eq!(hint.severity_bucket, ConfidenceBucket::High);
        assert!((hint.confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_label_without_separator() {
        let hint = EdgeHint::from_label("Leaf_curl", 0.3);
        assert_eq!(hint.crop_label, "Unknown");
        assert_eq!(hint.disease_label, "Leaf curl");
        assert_eq!(hint.severity_bucket, ConfidenceBucket::Low);
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(ConfidenceBucket::from_confidence(0.81), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_confidence(0.8), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_confidence(0.51), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_confidence(0.5), ConfidenceBucket::Low);
        assert_eq!(ConfidenceBucket::from_confidence(0.0), ConfidenceBucket::Low);
    }

    #[test]
    fn test_confidence_is_clamped_and_rounded() {
        let hint = EdgeHint::from_label("Apple___Black_rot", 1.7);
        assert_eq!(hint.confidence, 1.0);

        let hint = EdgeHint::from_label("Apple___Black_rot", 0.123456);
        assert!((hint.confidence - 0.1235).abs() < 1e-6);
    }

    #[test]
    fn test_blank_crop_hint_is_dropped() {
        let input = ImageInput::new(vec![1u8, 2, 3], Some("   ".to_string()));
        assert_eq!(input.crop_hint(), None);

        let input = ImageInput::new(vec![1u8], Some(" Rice ".to_string()));
        assert_eq!(input.crop_hint(), Some("Rice"));
    }

    #[test]
    fn test_result_serializes_camel_case_without_crop() {
        let result = DiagnosisResult {
            disease_name: "Early blight".to_string(),
            confidence: Some(0.9),
            severity: Severity::Medium,
            description: String::new(),
            treatment: vec![],
            organic_alternatives: vec![],
            prevention: vec![],
            next_steps: String::new(),
            products: vec![],
            crop: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["diseaseName"], "Early blight");
        assert_eq!(json["severity"], "Medium");
        assert!(json.get("organicAlternatives").is_some());
        assert!(json.get("crop").is_none());
    }
}
