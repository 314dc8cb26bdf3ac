//! Thin HTTP adapter in front of the orchestrator.

use crate::error::DiagnosisError;
use crate::metrics;
use crate::orchestrator::DiagnosisOrchestrator;
use crate::types::ImageInput;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

impl IntoResponse for DiagnosisError {
    fn into_response(self) -> Response {
        let status = match &self {
            DiagnosisError::EmptyImage => StatusCode::BAD_REQUEST,
            DiagnosisError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            DiagnosisError::Failed { .. } => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub fn router(orchestrator: Arc<DiagnosisOrchestrator>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

/// Multipart upload: `file` (required), `crop` (optional).
async fn predict_handler(
    State(orchestrator): State<Arc<DiagnosisOrchestrator>>,
    mut multipart: Multipart,
) -> Response {
    let mut image: Option<Vec<u8>> = None;
    let mut crop: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return multipart_error("Invalid multipart body", e),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => match field.bytes().await {
                Ok(bytes) => image = Some(bytes.to_vec()),
                Err(e) => return multipart_error("Failed to read file", e),
            },
            Some("crop") => match field.text().await {
                Ok(text) => crop = Some(text),
                Err(e) => return multipart_error("Failed to read crop", e),
            },
            _ => {}
        }
    }

    let Some(image) = image else {
        return bad_request("Missing file field".to_string());
    };

    match orchestrator.handle(ImageInput::new(image, crop)).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    }
}

fn bad_request(detail: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
}

/// Keeps axum's status for multipart failures, so an upload over the body
/// limit is a 413 rather than a malformed request.
fn multipart_error(context: &str, err: MultipartError) -> Response {
    let status = err.status();
    let detail = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "Uploaded file is too large".to_string()
    } else {
        format!("{}: {}", context, err.body_text())
    };
    (status, Json(json!({ "detail": detail }))).into_response()
}

async fn health_handler(State(orchestrator): State<Arc<DiagnosisOrchestrator>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "edge_model_ready": orchestrator.edge().is_ready(),
        "providers": orchestrator.cascade().provider_ids(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> String {
    metrics::export_metrics()
}
