//! Router tests for `POST /api/convertPdf`, driven with `tower::ServiceExt`.

#![cfg(feature = "server")]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::*;
use pdf_flatten::server::{router, AppState, ConvertResponse, ErrorResponse, HealthResponse};
use pdf_flatten::{ErrorCategory, FlattenConfig, Rasterizer};
use std::sync::Arc;
use tower::ServiceExt;

fn app(root: &std::path::Path, rasterizer: Arc<dyn Rasterizer>) -> Router {
    limited_app(root, rasterizer, 1024 * 1024)
}

fn limited_app(root: &std::path::Path, rasterizer: Arc<dyn Rasterizer>, limit: usize) -> Router {
    let config = FlattenConfig::builder()
        .workspace_root(root)
        .rasterizer(rasterizer)
        .build()
        .unwrap();
    router(AppState::new(config), limit)
}

fn post_json(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/convertPdf")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn converts_base64_pdf() {
    let root = tempfile::tempdir().unwrap();
    let app = app(
        root.path(),
        Arc::new(MemoryRasterizer::sized(&[(120, 80), (80, 120)])),
    );
    let body = serde_json::json!({ "base64Pdf": STANDARD.encode(FAKE_PDF) }).to_string();

    let response = app.oneshot(post_json(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: ConvertResponse = read_json(response).await;
    assert!(json.success);
    assert!(!json.message.is_empty());
    let pdf = STANDARD.decode(json.data).unwrap();
    assert_eq!(inspect_pdf(&pdf).0, 2);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn missing_field_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path(), Arc::new(MemoryRasterizer::sized(&[(1, 1)])));

    let response = app.oneshot(post_json("{}".to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json: ErrorResponse = read_json(response).await;
    assert_eq!(json.category, ErrorCategory::InputValidation);
    assert!(json.details.contains("required"), "{}", json.details);
}

#[tokio::test]
async fn non_pdf_payload_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path(), Arc::new(MemoryRasterizer::sized(&[(1, 1)])));
    let body = serde_json::json!({ "base64Pdf": STANDARD.encode(b"hello world") }).to_string();

    let response = app.oneshot(post_json(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path(), Arc::new(MemoryRasterizer::sized(&[(1, 1)])));

    let response = app
        .oneshot(post_json("{ not json".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pipeline_failure_is_internal_error() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path(), Arc::new(FailingRasterizer::new()));
    let body = serde_json::json!({ "base64Pdf": STANDARD.encode(FAKE_PDF) }).to_string();

    let response = app.oneshot(post_json(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json: ErrorResponse = read_json(response).await;
    assert_eq!(json.error, "Internal Server Error");
    assert_eq!(json.category, ErrorCategory::Rasterization);
    assert!(json.details.starts_with("rasterization failed:"));
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn oversized_body_is_payload_too_large() {
    let root = tempfile::tempdir().unwrap();
    let app = limited_app(root.path(), Arc::new(MemoryRasterizer::sized(&[(1, 1)])), 256);
    let body = serde_json::json!({ "base64Pdf": STANDARD.encode([b'%'; 4096]) }).to_string();

    let response = app.oneshot(post_json(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json: ErrorResponse = read_json(response).await;
    assert_eq!(json.error, "Payload Too Large");
    assert_eq!(json.category, ErrorCategory::InputValidation);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn workspace_failure_does_not_expose_paths() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("missing-root");
    let app = app(&missing, Arc::new(MemoryRasterizer::sized(&[(1, 1)])));
    let body = serde_json::json!({ "base64Pdf": STANDARD.encode(FAKE_PDF) }).to_string();

    let response = app.oneshot(post_json(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json: ErrorResponse = read_json(response).await;
    assert_eq!(json.category, ErrorCategory::WorkspaceCreation);
    assert!(json.details.starts_with("workspace creation failed"));
    assert!(
        !json.details.contains(&root.path().display().to_string()),
        "path leaked: {}",
        json.details
    );
    assert!(!json.details.contains("pdf_flatten_"), "{}", json.details);
}

#[tokio::test]
async fn health_reports_version() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path(), Arc::new(MemoryRasterizer::sized(&[(1, 1)])));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: HealthResponse = read_json(response).await;
    assert_eq!(json.status, "ok");
    assert_eq!(json.version, env!("CARGO_PKG_VERSION"));
}
