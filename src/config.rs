use crate::backoff::BackoffPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_VISION_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Vision models tried in order (Llama 4 supports native vision)
pub const DEFAULT_VISION_MODELS: &[&str] = &[
    "meta-llama/llama-4-scout-17b-16e-instruct",
    "meta-llama/llama-4-maverick-17b-128e-instruct",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub max_upload_bytes: usize,
    pub cascade: CascadeConfig,
    pub edge: EdgeConfig,
}

/// Ordered provider list and per-attempt policy. Loaded once, never mutated.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub api_url: String,
    /// No key means no remote tier at all
    pub api_key: Option<String>,
    pub models: Vec<String>,
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_VISION_API_URL.to_string(),
            api_key: None,
            models: DEFAULT_VISION_MODELS.iter().map(|m| m.to_string()).collect(),
            attempt_timeout: Duration::from_secs(45),
            backoff: BackoffPolicy::default(),
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// Memory layout of the edge model's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the Keras export default
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub layout: TensorLayout,
    pub max_concurrency: usize,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/plant_disease.onnx"),
            labels_path: None,
            input_size: 256,
            layout: TensorLayout::Nhwc,
            max_concurrency: 1,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparseable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn load() -> Self {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env_or("API_PORT", 8000u16);
        let max_upload_bytes = env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize);

        Self {
            api_host,
            api_port,
            max_upload_bytes,
            cascade: CascadeConfig::load(),
            edge: EdgeConfig::load(),
        }
    }
}

impl CascadeConfig {
    pub fn load() -> Self {
        let defaults = CascadeConfig::default();

        let api_url = env_nonempty("VISION_API_URL").unwrap_or(defaults.api_url);

        // Provider key, accepting the Groq-specific name as well
        let api_key = env_nonempty("VISION_API_KEY").or_else(|| env_nonempty("GROQ_API_KEY"));

        let models: Vec<String> = env::var("VISION_MODELS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let models = if models.is_empty() { defaults.models } else { models };

        let attempt_timeout = Duration::from_secs(env_or("VISION_TIMEOUT_SECS", 45u64));

        let backoff_ms = env_or("RATE_LIMIT_BACKOFF_MS", 2000u64);
        let backoff_max_ms = env_or("RATE_LIMIT_BACKOFF_MAX_MS", backoff_ms.saturating_mul(16));
        let strategy = env::var("RATE_LIMIT_BACKOFF_STRATEGY").unwrap_or_else(|_| "fixed".to_string());
        let backoff = match strategy.trim().to_ascii_lowercase().as_str() {
            "exponential" => BackoffPolicy::Exponential {
                base_delay: Duration::from_millis(backoff_ms),
                max_delay: Duration::from_millis(backoff_max_ms),
            },
            "none" => BackoffPolicy::None,
            _ => BackoffPolicy::Fixed {
                delay: Duration::from_millis(backoff_ms),
            },
        };

        Self {
            api_url,
            api_key,
            models,
            attempt_timeout,
            backoff,
            temperature: env_or("VISION_TEMPERATURE", defaults.temperature),
            max_tokens: env_or("VISION_MAX_TOKENS", defaults.max_tokens),
        }
    }
}

impl EdgeConfig {
    pub fn load() -> Self {
        let defaults = EdgeConfig::default();

        Self {
            model_path: env_nonempty("EDGE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            labels_path: env_nonempty("EDGE_LABELS_PATH").map(PathBuf::from),
            input_size: env_or("EDGE_INPUT_SIZE", defaults.input_size).max(1),
            layout: env_or("EDGE_INPUT_LAYOUT", defaults.layout),
            max_concurrency: env_or("EDGE_MAX_CONCURRENCY", defaults.max_concurrency).max(1),
        }
    }
}
