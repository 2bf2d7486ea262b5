//! HTTP boundary: `POST /api/convertPdf`.
//!
//! The request carries the document base64-wrapped in JSON; the response
//! carries the flattened document the same way. Every request runs its own
//! pipeline in its own workspace, so requests never share state beyond the
//! immutable [`FlattenConfig`].

use crate::config::FlattenConfig;
use crate::convert::flatten_base64;
use crate::error::{ErrorCategory, FlattenError};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Default request body limit: 50 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared, read-only server state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FlattenConfig>,
}

impl AppState {
    pub fn new(config: FlattenConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    #[serde(rename = "base64Pdf")]
    pub base64_pdf: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub success: bool,
    pub message: String,
    /// Flattened document, base64.
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub category: ErrorCategory,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error wrapper that renders as `{ error, category, details }`.
///
/// Client errors are 400 and pipeline faults 500, except a body over the
/// configured limit, which keeps its 413.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: FlattenError,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error(&self) -> &FlattenError {
        &self.error
    }
}

impl From<FlattenError> for ApiError {
    fn from(error: FlattenError) -> Self {
        let status = if error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self { status, error }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            error: FlattenError::InputValidation(rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Flatten request failed: {}", self.error);
        } else {
            warn!("Rejected flatten request: {}", self.error);
        }

        let body = ErrorResponse {
            error: self.status.canonical_reason().unwrap_or("Error").to_string(),
            category: self.error.category(),
            details: self.error.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the application router.
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/convertPdf", post(convert_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(addr: SocketAddr, state: AppState, body_limit: usize) -> std::io::Result<()> {
    let app = router(state, body_limit);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("pdf-flatten server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn root() -> &'static str {
    "pdf-flatten: POST a base64 PDF to /api/convertPdf"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn convert_pdf(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let Json(request) = payload?;
    let encoded = request
        .base64_pdf
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| FlattenError::InputValidation("base64 PDF data is required".into()))?;

    let data = flatten_base64(&encoded, &state.config).await?;

    Ok(Json(ConvertResponse {
        success: true,
        message: "PDF converted successfully".to_string(),
        data,
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
