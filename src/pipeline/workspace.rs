//! Per-request scratch directories.
//!
//! The subprocess rasteriser can only talk to us through files, so every
//! request gets its own uniquely-named directory. Names come from
//! [`tempfile`], which creates the directory atomically with a random
//! suffix; two concurrent requests can never collide on a path.
//!
//! [`Workspace::release`] consumes the handle, so a workspace is released at
//! most once. If a handle is dropped without being released (a panic
//! unwinding through the orchestrator), `TempDir`'s own `Drop` still removes
//! the directory.

use crate::error::FlattenError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "pdf_flatten_";

/// An exclusively-owned scratch directory for one flatten run.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `root`, or under the system temp dir.
    pub fn acquire(root: Option<&Path>) -> Result<Self, FlattenError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| FlattenError::WorkspaceCreation { source })?;

        debug!("Workspace acquired: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Replace every occurrence of the workspace path in `text`.
    ///
    /// Tool diagnostics quote the files they were given; boundaries must not
    /// echo scratch paths back to callers.
    pub fn redact(&self, text: &str) -> String {
        let path = self.dir.path().to_string_lossy();
        if path.is_empty() {
            return text.to_string();
        }
        text.replace(path.as_ref(), "<workspace>")
    }

    /// Delete the directory and everything in it.
    ///
    /// Runs on the blocking pool. Failure is logged and swallowed: cleanup
    /// must never turn a finished request into a failed one.
    pub async fn release(self) {
        let path = self.dir.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || self.dir.close()).await;

        match result {
            Ok(Ok(())) => debug!("Workspace released: {}", path.display()),
            Ok(Err(e)) => warn!("Failed to remove workspace {}: {}", path.display(), e),
            Err(e) => warn!("Workspace cleanup task failed for {}: {}", path.display(), e),
        }
    }
}
