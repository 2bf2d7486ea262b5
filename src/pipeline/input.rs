//! Input handling at the pipeline boundary: base64 transport wrapping, local
//! file reads, and the `%PDF` magic check.
//!
//! The check runs before any workspace is created, so a request with a
//! missing or non-PDF payload never reaches the rasteriser.

use crate::error::FlattenError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Reject empty payloads and anything that does not start with `%PDF`.
pub fn validate_document(bytes: &[u8]) -> Result<(), FlattenError> {
    if bytes.is_empty() {
        return Err(FlattenError::InputValidation("document is empty".into()));
    }
    if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        let shown = &bytes[..bytes.len().min(PDF_MAGIC.len())];
        return Err(FlattenError::InputValidation(format!(
            "document is not a PDF (first bytes: {shown:?})"
        )));
    }
    Ok(())
}

/// Decode a base64 transport string into document bytes.
///
/// Surrounding whitespace and embedded line breaks (MIME-style wrapping) are
/// ignored. A `data:application/pdf;base64,` prefix is accepted.
pub fn decode_base64_document(encoded: &str) -> Result<Vec<u8>, FlattenError> {
    let trimmed = encoded.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((scheme, rest)) if scheme.starts_with("data:") => rest,
        _ => trimmed,
    };
    if payload.is_empty() {
        return Err(FlattenError::InputValidation(
            "base64 PDF data is required".into(),
        ));
    }

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| FlattenError::InputValidation(format!("invalid base64: {e}")))?;

    debug!("Decoded base64 input → {} bytes", bytes.len());
    Ok(bytes)
}

/// Encode document bytes for the transport wrapper.
pub fn encode_base64_document(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Read a local PDF, mapping missing files and permission problems to their
/// own errors.
pub async fn read_local(path: &Path) -> Result<Vec<u8>, FlattenError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlattenError::FileNotFound {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::PermissionDenied => FlattenError::PermissionDenied {
            path: PathBuf::from(path),
        },
        _ => FlattenError::InputValidation(format!("cannot read '{}': {e}", path.display())),
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}
