//! Deterministic advice used when no remote provider produced a diagnosis.
//!
//! The advisor starts from a generic field-care template and applies the
//! first matching rule from [`RULES`] against the lower-cased disease label.
//! It performs no I/O, so the same hint always yields the same result.

use crate::types::{DiagnosisResult, EdgeHint, Severity};

/// Prefix disclosing that the result is a degraded, local-only estimate.
pub const DEGRADED_NOTICE: &str =
    "Cloud AI is currently unavailable. Providing a local best-effort estimate:";

/// Field overrides a rule may apply to the template.
#[derive(Debug)]
pub struct AdviceRule {
    pub pattern: &'static str,
    pub severity: Option<Severity>,
    /// `{crop}` and `{disease}` are substituted
    pub description: Option<&'static str>,
    /// Replaces the template treatment list
    pub treatment: Option<&'static [&'static str]>,
    /// Inserted ahead of the template treatment steps
    pub prepend_treatment: Option<&'static str>,
    pub next_steps: Option<&'static str>,
}

/// Evaluated in order, first match wins.
pub const RULES: &[AdviceRule] = &[
    AdviceRule {
        pattern: "healthy",
        severity: Some(Severity::Healthy),
        description: Some("Your {crop} appears healthy! No immediate disease symptoms detected."),
        treatment: Some(&[
            "No chemical treatment required.",
            "Continue regular watering and fertilization.",
        ]),
        prepend_treatment: None,
        next_steps: Some("Maintain your current care routine."),
    },
    AdviceRule {
        pattern: "blight",
        severity: None,
        description: None,
        treatment: None,
        prepend_treatment: Some("Apply copper-based fungicides if humidity is high."),
        next_steps: None,
    },
    AdviceRule {
        pattern: "rot",
        severity: None,
        description: None,
        treatment: None,
        prepend_treatment: Some("Drastically reduce watering and improve soil drainage."),
        next_steps: None,
    },
];

const BASE_DESCRIPTION: &str =
    "Initial screening suggests localized symptoms of {disease} on {crop}. Local ML identification complete.";

const BASE_TREATMENT: &[&str] = &[
    "Prune and destroy infected plant parts immediately.",
    "Avoid overhead irrigation to reduce humidity on leaves.",
    "Consult a local agricultural specialist for specific fungicides/pesticides.",
];

const BASE_ORGANIC: &[&str] = &[
    "Apply Neem Oil spray (5ml per liter of water) for general pest/fungal control.",
    "Use wood ash around the base to manage soil acidity.",
];

const BASE_PREVENTION: &[&str] = &[
    "Ensure proper spacing between plants for ventilation.",
    "Maintain balanced soil nutrient levels (NPK).",
    "Rotate crops annually to break the disease cycle.",
];

const BASE_NEXT_STEPS: &str =
    "Monitor the field daily for further spread and check soil moisture.";

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackAdvisor;

impl FallbackAdvisor {
    pub fn new() -> Self {
        Self
    }

    /// Synthesize a degraded diagnosis from the edge classifier's hint.
    pub fn advise(&self, hint: &EdgeHint) -> DiagnosisResult {
        let disease = hint.disease_label.to_lowercase();
        let crop = hint.crop_label.to_lowercase();
        let fill = |template: &str| template.replace("{disease}", &disease).replace("{crop}", &crop);

        let mut severity = Severity::from(hint.severity_bucket);
        let mut description = fill(BASE_DESCRIPTION);
        let mut treatment: Vec<String> = BASE_TREATMENT.iter().map(|s| s.to_string()).collect();
        let mut next_steps = BASE_NEXT_STEPS.to_string();

        if let Some(rule) = RULES.iter().find(|r| disease.contains(r.pattern)) {
            if let Some(s) = rule.severity {
                severity = s;
            }
            if let Some(d) = rule.description {
                description = fill(d);
            }
            if let Some(steps) = rule.treatment {
                treatment = steps.iter().map(|s| s.to_string()).collect();
            }
            if let Some(step) = rule.prepend_treatment {
                treatment.insert(0, step.to_string());
            }
            if let Some(n) = rule.next_steps {
                next_steps = n.to_string();
            }
        }

        DiagnosisResult {
            disease_name: hint.disease_label.clone(),
            confidence: Some(f64::from(hint.confidence)),
            severity,
            description: format!("{} {}", DEGRADED_NOTICE, description),
            treatment,
            organic_alternatives: BASE_ORGANIC.iter().map(|s| s.to_string()).collect(),
            prevention: BASE_PREVENTION.iter().map(|s| s.to_string()).collect(),
            next_steps,
            products: Vec::new(),
            crop: Some(hint.crop_label.clone()),
        }
    }
}
