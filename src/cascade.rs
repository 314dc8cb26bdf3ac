//! Ordered fallback across remote vision providers.
//!
//! ```text
//!   provider[0] ──ok──▶ result
//!       │ 429 ─▶ backoff ─┐
//!       │ err/timeout/invalid
//!       ▼                 ▼
//!   provider[1] ──ok──▶ result
//!       │
//!       ▼
//!      ...  ──▶ CascadeExhausted(attempts)
//! ```
//!
//! Attempts are strictly sequential and each provider is tried at most once
//! per request. The first schema-valid reply wins.

use crate::backoff::BackoffPolicy;
use crate::config::CascadeConfig;
use crate::error::ConfigError;
use crate::metrics;
use crate::provider::{OpenAiVisionProvider, ProviderError, VisionProvider, VisionRequest};
use crate::types::{AttemptOutcome, DiagnosisResult, ProviderAttempt};
use crate::validator;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const RATE_LIMITED_DETAIL: &str = "Rate limited: please wait a moment";
const NO_PROVIDERS_DETAIL: &str = "no vision providers configured";

/// Every provider failed. Carries the full attempt log.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeExhausted {
    pub attempts: Vec<ProviderAttempt>,
}

impl fmt::Display for CascadeExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all vision providers exhausted: {}", self.last_error())
    }
}

impl std::error::Error for CascadeExhausted {}

impl CascadeExhausted {
    /// Detail of the most recent attempt.
    pub fn last_error(&self) -> String {
        self.attempts
            .last()
            .and_then(|a| a.error_detail.clone())
            .unwrap_or_else(|| NO_PROVIDERS_DETAIL.to_string())
    }
}

pub struct ProviderCascade {
    providers: Vec<Arc<dyn VisionProvider>>,
    attempt_timeout: Duration,
    backoff: BackoffPolicy,
}

impl ProviderCascade {
    pub fn new(
        providers: Vec<Arc<dyn VisionProvider>>,
        attempt_timeout: Duration,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            providers,
            attempt_timeout,
            backoff,
        }
    }

    pub fn from_config(config: &CascadeConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            OpenAiVisionProvider::from_config(config)?,
            config.attempt_timeout,
            config.backoff.clone(),
        ))
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Try each provider in order until one returns a valid diagnosis.
    pub async fn diagnose(
        &self,
        image: &[u8],
        prompt: String,
    ) -> Result<DiagnosisResult, CascadeExhausted> {
        let request = VisionRequest::new(prompt, image);
        let mut attempts = Vec::with_capacity(self.providers.len());
        let mut rate_limits = 0u32;

        for (index, provider) in self.providers.iter().enumerate() {
            let provider_id = provider.id();
            info!(provider = %provider_id, "✨ Trying vision provider {}/{}", index + 1, self.providers.len());

            let start = Instant::now();
            let attempt = match self.attempt(provider.as_ref(), &request).await {
                Ok(result) => {
                    metrics::record_attempt(provider_id, AttemptOutcome::Success, start.elapsed());
                    info!(
                        provider = %provider_id,
                        latency_ms = start.elapsed().as_millis() as u64,
                        disease = %result.disease_name,
                        "🎯 Vision provider succeeded"
                    );
                    return Ok(result);
                }
                Err(attempt) => attempt,
            };

            metrics::record_attempt(provider_id, attempt.outcome, start.elapsed());
            warn!(
                provider = %provider_id,
                outcome = %attempt.outcome,
                detail = attempt.error_detail.as_deref().unwrap_or(""),
                "⚠️ Vision provider failed, moving on"
            );

            let rate_limited = attempt.outcome == AttemptOutcome::RateLimited;
            attempts.push(attempt);

            if rate_limited && index + 1 < self.providers.len() {
                rate_limits += 1;
                self.backoff.wait(rate_limits).await;
            }
        }

        let exhausted = CascadeExhausted { attempts };
        warn!("🚨 All vision providers exhausted. Last error: {}", exhausted.last_error());
        Err(exhausted)
    }

    /// One bounded call plus validation, classified into an attempt record.
    async fn attempt(
        &self,
        provider: &dyn VisionProvider,
        request: &VisionRequest,
    ) -> Result<DiagnosisResult, ProviderAttempt> {
        let id = provider.id();

        let reply = match tokio::time::timeout(self.attempt_timeout, provider.complete(request)).await {
            Ok(reply) => reply,
            Err(_) => Err(ProviderError::Timeout),
        };

        let content = reply.map_err(|err| classify(id, err, self.attempt_timeout))?;

        validator::validate(&content).map_err(|err| {
            ProviderAttempt::failure(
                id,
                AttemptOutcome::InvalidResponse,
                format!("{} returned an invalid diagnosis: {}", id, err),
            )
        })
    }
}

fn classify(id: &str, err: ProviderError, timeout: Duration) -> ProviderAttempt {
    match err {
        ProviderError::RateLimited => {
            ProviderAttempt::failure(id, AttemptOutcome::RateLimited, RATE_LIMITED_DETAIL)
        }
        ProviderError::Status { status, body } => {
            // The body stays in the logs, callers only see the status
            warn!(provider = %id, status, body = %body, "Provider returned an error status");
            ProviderAttempt::failure(
                id,
                AttemptOutcome::TransportError,
                format!("{} returned HTTP {}", id, status),
            )
        }
        ProviderError::Transport(reason) => ProviderAttempt::failure(
            id,
            AttemptOutcome::TransportError,
            format!("{} request failed: {}", id, reason),
        ),
        ProviderError::Timeout => ProviderAttempt::failure(
            id,
            AttemptOutcome::Timeout,
            format!("{} timed out ({}s)", id, timeout.as_secs_f32()),
        ),
        ProviderError::Envelope(reason) => ProviderAttempt::failure(
            id,
            AttemptOutcome::InvalidResponse,
            format!("{} returned an invalid diagnosis: {}", id, reason),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_uses_latest_attempt() {
        let exhausted = CascadeExhausted {
            attempts: vec![
                ProviderAttempt::failure("a", AttemptOutcome::Timeout, "a timed out (45s)"),
                ProviderAttempt::failure("b", AttemptOutcome::TransportError, "b returned HTTP 500"),
            ],
        };
        assert_eq!(exhausted.last_error(), "b returned HTTP 500");
    }

    #[test]
    fn test_last_error_without_attempts() {
        let exhausted = CascadeExhausted { attempts: vec![] };
        assert_eq!(exhausted.last_error(), NO_PROVIDERS_DETAIL);
    }

    #[test]
    fn test_status_errors_hide_body() {
        let attempt = classify(
            "model-x",
            ProviderError::Status {
                status: 503,
                body: "{\"error\":\"secret internals\"}".to_string(),
            },
            Duration::from_secs(45),
        );
        assert_eq!(attempt.outcome, AttemptOutcome::TransportError);
        let detail = attempt.error_detail.unwrap();
        assert_eq!(detail, "model-x returned HTTP 503");
        assert!(!detail.contains("secret"));
    }

    #[test]
    fn test_rate_limited_detail() {
        let attempt = classify("m", ProviderError::RateLimited, Duration::from_secs(45));
        assert_eq!(attempt.outcome, AttemptOutcome::RateLimited);
        let detail = attempt.error_detail.unwrap();
        assert_eq!(detail, "Rate limited: please wait a moment");
        assert!(detail.is_ascii());
    }

    #[test]
    fn test_timeout_detail() {
        let attempt = classify("m", ProviderError::Timeout, Duration::from_secs(45));
        assert_eq!(attempt.outcome, AttemptOutcome::Timeout);
        assert_eq!(attempt.error_detail.as_deref(), Some("m timed out (45s)"));
    }

    #[tokio::test]
    async fn test_empty_cascade_exhausts_immediately() {
        let cascade = ProviderCascade::new(vec![], Duration::from_secs(1), BackoffPolicy::None);
        assert!(!cascade.is_configured());

        let err = cascade.diagnose(b"img", "prompt".to_string()).await.unwrap_err();
        assert!(err.attempts.is_empty());
        assert_eq!(err.last_error(), NO_PROVIDERS_DETAIL);
    }
}
