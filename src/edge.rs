//! Edge Classifier Module
//!
//! Runs the locally hosted plant-disease classifier to produce a hint for the
//! remote providers and a seed for degraded results.
//!
//! - The model is optional: a missing or incompatible artifact leaves the
//!   classifier permanently "not ready" and every inference returns `None`.
//! - Inference is CPU bound and runs on the blocking pool, gated by a
//!   semaphore so queued requests wait asynchronously instead of pinning
//!   runtime workers.
//! - Failures never escape [`EdgeClassifier::infer`]; they are logged and the
//!   diagnosis proceeds without a hint.

use crate::config::{EdgeConfig, TensorLayout};
use crate::metrics;
use crate::types::EdgeHint;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::Session;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Label file unusable: {0}")]
    Labels(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Inference execution failed: {0}")]
    Inference(String),

    #[error("Model produced {outputs} scores but {labels} labels are known")]
    LabelMismatch { outputs: usize, labels: usize },
}

/// Classes of the bundled PlantVillage subset, in model output order.
pub const DEFAULT_LABELS: &[&str] = &[
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___healthy",
];

// ============================================================================
// Classifier backends
// ============================================================================

/// Top-1 prediction of an image classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Blocking image classifier. Called from the blocking thread pool only.
pub trait ImageClassifier: Send + Sync + 'static {
    fn classify(&self, image: &[u8]) -> Result<Prediction, EdgeError>;
}

/// ONNX Runtime backed classifier.
pub struct OnnxClassifier {
    // ort sessions need exclusive access to run
    session: Mutex<Session>,
    labels: Vec<String>,
    input_size: u32,
    layout: TensorLayout,
}

impl OnnxClassifier {
    pub fn load(config: &EdgeConfig) -> Result<Self, EdgeError> {
        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(EdgeError::ModelLoad(format!(
                "model not found at {}",
                model_path.display()
            )));
        }

        let labels = load_labels(config.labels_path.as_deref())?;

        // A missing or mismatched runtime library can panic inside ort
        let built = std::panic::catch_unwind(|| {
            Session::builder().and_then(|builder| builder.commit_from_file(model_path))
        })
        .map_err(|_| EdgeError::ModelLoad("ONNX Runtime unavailable".to_string()))?;
        let session = built.map_err(|e| EdgeError::ModelLoad(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_size: config.input_size,
            layout: config.layout,
        })
    }
}

impl ImageClassifier for OnnxClassifier {
    fn classify(&self, image: &[u8]) -> Result<Prediction, EdgeError> {
        let input = preprocess(image, self.input_size, self.layout)?;
        let tensor = ort::value::Tensor::from_array(input)
            .map_err(|e| EdgeError::Inference(format!("Failed to create tensor: {}", e)))?;

        let scores: Vec<f32> = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EdgeError::Inference("session lock poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| EdgeError::Inference(format!("Inference failed: {}", e)))?;
            let (_, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EdgeError::Inference(format!("Failed to extract output: {}", e)))?;
            data.to_vec()
        };

        if scores.len() != self.labels.len() {
            return Err(EdgeError::LabelMismatch {
                outputs: scores.len(),
                labels: self.labels.len(),
            });
        }

        let probabilities = to_probabilities(&scores);
        let (index, score) = top_class(&probabilities)
            .ok_or_else(|| EdgeError::Inference("model produced no finite scores".to_string()))?;

        Ok(Prediction {
            label: self.labels[index].clone(),
            score,
        })
    }
}

/// Decode, resize and scale an image into the model's input tensor.
pub fn preprocess(image: &[u8], size: u32, layout: TensorLayout) -> Result<Array4<f32>, EdgeError> {
    let decoded = image::load_from_memory(image).map_err(|e| EdgeError::Decode(e.to_string()))?;
    let rgb = decoded.resize_exact(size, size, FilterType::CatmullRom).to_rgb8();
    let side = size as usize;

    let pixel = |x: usize, y: usize, c: usize| rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;

    Ok(match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| pixel(x, y, c)),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| pixel(x, y, c)),
    })
}

/// Normalize raw model outputs into class probabilities.
///
/// Models exported with a softmax head already emit a distribution and pass
/// through unchanged. Logit outputs get a max-shifted softmax. Non-finite
/// scores are treated as impossible classes.
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let finite = || scores.iter().copied().filter(|s| s.is_finite());

    let in_unit_range = finite().all(|s| (0.0..=1.0).contains(&s));
    let total: f32 = finite().sum();
    if in_unit_range && (total - 1.0).abs() < 1e-3 {
        return scores.to_vec();
    }

    let Some(max) = finite().max_by(|a, b| a.total_cmp(b)) else {
        return scores.to_vec();
    };

    let exps: Vec<f32> = scores
        .iter()
        .map(|&s| if s.is_finite() { (s - max).exp() } else { 0.0 })
        .collect();
    // The max class contributes exp(0) = 1, so the sum is never zero
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and score of the highest finite score.
pub fn top_class(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Read one label per line, ignoring blank lines. `None` selects the built-in set.
pub fn load_labels(path: Option<&Path>) -> Result<Vec<String>, EdgeError> {
    let Some(path) = path else {
        return Ok(DEFAULT_LABELS.iter().map(|l| l.to_string()).collect());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| EdgeError::Labels(format!("{}: {}", path.display(), e)))?;
    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(EdgeError::Labels(format!("{} has no labels", path.display())));
    }
    Ok(labels)
}

// ============================================================================
// EdgeClassifier
// ============================================================================

/// Process-wide, read-only local classifier shared by all requests.
pub struct EdgeClassifier {
    model: Option<Arc<dyn ImageClassifier>>,
    permits: Arc<Semaphore>,
}

impl EdgeClassifier {
    /// Load the ONNX model. Never fails: problems are logged and the
    /// classifier stays unready for the life of the process.
    pub fn load(config: &EdgeConfig) -> Self {
        match OnnxClassifier::load(config) {
            Ok(model) => {
                info!("✅ Edge model loaded: {}", config.model_path.display());
                Self::with_model(Arc::new(model), config.max_concurrency)
            }
            Err(e) => {
                warn!("⚠️ Edge model unavailable, continuing without local hints: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn with_model(model: Arc<dyn ImageClassifier>, max_concurrency: usize) -> Self {
        Self {
            model: Some(model),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            model: None,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// Best-effort local identification. `None` when not ready or on any failure.
    pub async fn infer(&self, image: Arc<[u8]>) -> Option<EdgeHint> {
        let model = self.model.clone()?;

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Edge inference slot unavailable: {}", e);
                return None;
            }
        };

        debug!("🧠 Running local identification");
        let start = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.classify(&image)
        })
        .await;

        match joined {
            Ok(Ok(prediction)) => {
                metrics::record_edge("ok", Some(start.elapsed()));
                let hint = EdgeHint::from_label(&prediction.label, prediction.score);
                info!(
                    disease = %hint.disease_label,
                    crop = %hint.crop_label,
                    confidence = hint.confidence,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "✅ Local identification complete"
                );
                Some(hint)
            }
            Ok(Err(e)) => {
                metrics::record_edge("error", Some(start.elapsed()));
                warn!("⚠️ Local identification failed: {}", e);
                None
            }
            Err(e) => {
                metrics::record_edge("error", None);
                warn!("⚠️ Local identification task aborted: {}", e);
                None
            }
        }
    }
}
