//! Wire-level tests for the OpenAI-compatible vision provider
//!
//! Each test talks to a throwaway axum server bound to 127.0.0.1:0.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use phyto_diagnosis::{
    BackoffPolicy, OpenAiVisionProvider, ProviderCascade, ProviderError, VisionProvider,
    VisionRequest,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const DIAGNOSIS: &str = r#"{"diseaseName":"Leaf Rust","confidence":0.8,"severity":"Medium","description":"Orange pustules.","treatment":["Remove leaves"],"organicAlternatives":[],"prevention":["Rotate crops"],"nextSteps":"Monitor.","products":[]}"#;

async fn ok_handler(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer test-key");
    let well_formed = body["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .is_some_and(|url| url.starts_with("data:image/"));

    if !authorized || !well_formed {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad request"})));
    }

    (
        StatusCode::OK,
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": DIAGNOSIS } }]
        })),
    )
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/ok", post(ok_handler))
        .route(
            "/limited",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        )
        .route(
            "/boom",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(1000)) }),
        )
        .route("/garbage", post(|| async { (StatusCode::OK, "<html>oops</html>") }))
        .route(
            "/empty",
            post(|| async { Json(json!({ "choices": [] })) }),
        )
        .route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "choices": [] }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn provider(addr: SocketAddr, path: &str, client: reqwest::Client) -> OpenAiVisionProvider {
    OpenAiVisionProvider::new(
        format!("model{}", path.replace('/', "-")),
        format!("http://{}{}", addr, path),
        "test-key",
        client,
    )
}

fn request() -> VisionRequest {
    VisionRequest::new("diagnose this leaf".to_string(), b"\xFF\xD8\xFF\xE0jpeg-ish")
}

#[tokio::test]
async fn test_success_returns_message_content() {
    let addr = spawn_upstream().await;
    let content = provider(addr, "/ok", reqwest::Client::new())
        .complete(&request())
        .await
        .unwrap();

    assert_eq!(content, DIAGNOSIS);
}

#[tokio::test]
async fn test_429_maps_to_rate_limited() {
    let addr = spawn_upstream().await;
    let err = provider(addr, "/limited", reqwest::Client::new())
        .complete(&request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited));
}

#[tokio::test]
async fn test_server_error_keeps_truncated_body() {
    let addr = spawn_upstream().await;
    let err = provider(addr, "/boom", reqwest::Client::new())
        .complete(&request())
        .await
        .unwrap_err();

    match err {
        ProviderError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), 200);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let addr = spawn_upstream().await;

    for path in ["/garbage", "/empty"] {
        let err = provider(addr, path, reqwest::Client::new())
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Envelope(_)), "{}: {:?}", path, err);
    }
}

#[tokio::test]
async fn test_client_timeout_maps_to_timeout() {
    let addr = spawn_upstream().await;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = provider(addr, "/slow", client)
        .complete(&request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Timeout));
}

#[tokio::test]
async fn test_unreachable_upstream_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = provider(addr, "/ok", reqwest::Client::new())
        .complete(&request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Transport(_)));
}

#[tokio::test]
async fn test_cascade_over_http_skips_failures() {
    let addr = spawn_upstream().await;
    let client = reqwest::Client::new();
    let providers: Vec<Arc<dyn VisionProvider>> = ["/limited", "/boom", "/garbage", "/ok"]
        .into_iter()
        .map(|path| Arc::new(provider(addr, path, client.clone())) as Arc<dyn VisionProvider>)
        .collect();
    let cascade = ProviderCascade::new(providers, Duration::from_secs(5), BackoffPolicy::None);

    let result = cascade
        .diagnose(b"img", "prompt".to_string())
        .await
        .unwrap();

    assert_eq!(result.disease_name, "Leaf Rust");
}
