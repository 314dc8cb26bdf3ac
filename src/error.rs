use thiserror::Error;

/// Terminal outcomes of a diagnosis request that the caller must see.
///
/// Everything below the orchestrator is absorbed into the next best path;
/// only these variants escape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosisError {
    #[error("Empty file")]
    EmptyImage,

    #[error("AI Service not configured")]
    NotConfigured,

    #[error("AI analysis failed. Last error: {last_error}")]
    Failed { last_error: String },
}

impl DiagnosisError {
    /// Whether the caller sent something unusable, as opposed to an upstream failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DiagnosisError::EmptyImage)
    }
}

/// Configuration errors raised while assembling the service at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}
