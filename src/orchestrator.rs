//! Diagnosis Orchestrator
//!
//! Hybrid pipeline: local edge identification, then the remote provider
//! cascade, then deterministic fallback advice.
//!
//! ```text
//!   ImageInput ─▶ EdgeClassifier (best effort) ─▶ prompt
//!                                                   │
//!                                     ProviderCascade ──ok──▶ DiagnosisResult
//!                                                   │ exhausted
//!                                   edge hint? ─yes─▶ FallbackAdvisor
//!                                                   │ no
//!                                                   ▼
//!                                          DiagnosisError
//! ```

use crate::advisor::FallbackAdvisor;
use crate::cascade::ProviderCascade;
use crate::edge::EdgeClassifier;
use crate::error::DiagnosisError;
use crate::metrics;
use crate::prompt;
use crate::types::{DiagnosisResult, ImageInput};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct DiagnosisOrchestrator {
    edge: Arc<EdgeClassifier>,
    cascade: ProviderCascade,
    advisor: FallbackAdvisor,
}

impl DiagnosisOrchestrator {
    pub fn new(edge: Arc<EdgeClassifier>, cascade: ProviderCascade) -> Self {
        Self {
            edge,
            cascade,
            advisor: FallbackAdvisor::new(),
        }
    }

    pub fn edge(&self) -> &EdgeClassifier {
        &self.edge
    }

    pub fn cascade(&self) -> &ProviderCascade {
        &self.cascade
    }

    /// Diagnose one photograph.
    pub async fn handle(&self, input: ImageInput) -> Result<DiagnosisResult, DiagnosisError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("diagnosis", %request_id);
        self.handle_inner(input).instrument(span).await
    }

    async fn handle_inner(&self, input: ImageInput) -> Result<DiagnosisResult, DiagnosisError> {
        info!(
            bytes = input.bytes().len(),
            "📸 Received analysis request | Crop context: {}",
            input.crop_hint().unwrap_or("None")
        );

        if input.is_empty() {
            warn!("❌ Rejecting empty image payload");
            metrics::record_diagnosis("rejected");
            return Err(DiagnosisError::EmptyImage);
        }

        let edge_hint = self.edge.infer(input.bytes().clone()).await;
        if edge_hint.is_none() {
            debug!("No edge hint available");
        }

        let context = prompt::build_context(input.crop_hint(), edge_hint.as_ref());
        let exhausted = match self
            .cascade
            .diagnose(input.bytes(), prompt::build_prompt(&context))
            .await
        {
            Ok(result) => {
                metrics::record_diagnosis("provider");
                return Ok(result);
            }
            Err(exhausted) => exhausted,
        };

        if let Some(hint) = edge_hint {
            info!("🔄 All vision providers failed. Falling back to edge result.");
            metrics::record_diagnosis("fallback");
            return Ok(self.advisor.advise(&hint));
        }

        metrics::record_diagnosis("failed");
        if !self.cascade.is_configured() {
            error!("❌ No vision providers configured and no edge model available");
            return Err(DiagnosisError::NotConfigured);
        }

        let last_error = exhausted.last_error();
        error!("🚨 Diagnosis failed after {} attempt(s). Last error: {}", exhausted.attempts.len(), last_error);
        Err(DiagnosisError::Failed { last_error })
    }
}
