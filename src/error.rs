//! Error types for the pdf-flatten library.
//!
//! A flatten run either produces a complete document or fails with exactly
//! one [`FlattenError`]. There is no per-page partial result: the first stage
//! that fails aborts the remaining stages, the workspace is still released,
//! and the error is returned with its stage prefix (`"rasterization failed:
//! …"`).
//!
//! Every error maps onto an [`ErrorCategory`] so boundaries (CLI, HTTP) can
//! report a machine-readable category next to the human-readable text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf-flatten library.
#[derive(Debug, Error)]
pub enum FlattenError {
    // ── Workspace ─────────────────────────────────────────────────────────
    /// The scratch directory could not be created (permissions, disk full).
    /// Only the error kind is displayed; `tempfile` appends the directory
    /// path to the io message, which stays reachable through `source()`.
    #[error("workspace creation failed: {}", .source.kind())]
    WorkspaceCreation {
        #[source]
        source: std::io::Error,
    },

    // ── Rasterisation ─────────────────────────────────────────────────────
    /// The rasteriser exited non-zero, produced no pages, or its output
    /// could not be ordered. `detail` carries the tool's own diagnostics.
    #[error("rasterization failed: {detail}")]
    Rasterization { detail: String },

    /// The rasteriser did not finish within the configured bound.
    #[error("rasterization failed: timed out after {secs}s")]
    RasterizationTimeout { secs: u64 },

    // ── Image processing ──────────────────────────────────────────────────
    /// A page image could not be decoded, resized, or re-encoded.
    #[error("image processing failed on page {page}: {detail}")]
    ImageProcessing { page: usize, detail: String },

    // ── Assembly ──────────────────────────────────────────────────────────
    /// An image could not be embedded or the document could not be serialised.
    #[error("assembly failed: {detail}")]
    Assembly { detail: String },

    /// Zero pages reached the assembler; a zero-page document is invalid.
    #[error("assembly failed: no pages to assemble")]
    EmptyDocument,

    // ── Input ─────────────────────────────────────────────────────────────
    /// The encoded input is missing, not valid base64, or not a PDF.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panicked, runtime unavailable).
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlattenError {
    /// Shorthand for [`FlattenError::Rasterization`].
    pub fn rasterization(detail: impl Into<String>) -> Self {
        Self::Rasterization {
            detail: detail.into(),
        }
    }

    /// Shorthand for [`FlattenError::Assembly`].
    pub fn assembly(detail: impl Into<String>) -> Self {
        Self::Assembly {
            detail: detail.into(),
        }
    }

    /// Machine-readable category for boundary responses.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::WorkspaceCreation { .. } => ErrorCategory::WorkspaceCreation,
            Self::Rasterization { .. } | Self::RasterizationTimeout { .. } => {
                ErrorCategory::Rasterization
            }
            Self::ImageProcessing { .. } => ErrorCategory::ImageProcessing,
            Self::Assembly { .. } | Self::EmptyDocument => ErrorCategory::Assembly,
            Self::InputValidation(_) => ErrorCategory::InputValidation,
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::OutputWriteFailed { .. } => ErrorCategory::Io,
            Self::InvalidConfig(_) => ErrorCategory::Config,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// True when the caller supplied bad input, as opposed to a pipeline fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::InputValidation | ErrorCategory::Config
        )
    }
}

/// Coarse error classification reported at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    WorkspaceCreation,
    Rasterization,
    ImageProcessing,
    Assembly,
    InputValidation,
    Io,
    Config,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkspaceCreation => "workspace_creation",
            Self::Rasterization => "rasterization",
            Self::ImageProcessing => "image_processing",
            Self::Assembly => "assembly",
            Self::InputValidation => "input_validation",
            Self::Io => "io",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
