pub mod advisor;
pub mod backoff;
pub mod cascade;
pub mod config;
pub mod edge;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod server;
pub mod types;
pub mod validator;

// Re-export commonly used types for easier testing
pub use crate::advisor::FallbackAdvisor;
pub use crate::backoff::BackoffPolicy;
pub use crate::cascade::{CascadeExhausted, ProviderCascade};
pub use crate::config::{CascadeConfig, Config, EdgeConfig, TensorLayout};
pub use crate::edge::{EdgeClassifier, EdgeError, ImageClassifier, Prediction};
pub use crate::error::{ConfigError, DiagnosisError};
pub use crate::orchestrator::DiagnosisOrchestrator;
pub use crate::provider::{OpenAiVisionProvider, ProviderError, VisionProvider, VisionRequest};
pub use crate::types::{
    AttemptOutcome, ConfidenceBucket, DiagnosisResult, EdgeHint, ImageInput, ProviderAttempt, Severity,
};
pub use crate::validator::{validate, ValidationError};
