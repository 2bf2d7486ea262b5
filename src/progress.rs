//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn FlattenProgressCallback>`] via
//! [`crate::config::FlattenConfigBuilder::progress_callback`] to observe a
//! run: every state transition of the orchestrator, and each page as it
//! finishes normalisation.
//!
//! # Example
//!
//! ```rust
//! use pdf_flatten::{FlattenConfig, FlattenProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl FlattenProgressCallback for PageCounter {
//!     fn on_page_normalized(&self, _index: usize, _total: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = FlattenConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::convert::PipelineState;
use std::sync::Arc;

/// Called by the orchestrator as a run progresses.
///
/// Implementations must be `Send + Sync`: page events fire from whichever
/// task finished normalising the page. All methods default to no-ops.
pub trait FlattenProgressCallback: Send + Sync {
    /// Called on every orchestrator state transition, including `Failed`.
    fn on_state(&self, state: PipelineState) {
        let _ = state;
    }

    /// Called once the rasteriser has produced the ordered page set.
    fn on_pages_rasterized(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when one page has been resized and re-encoded.
    ///
    /// `index` is 0-based. Calls arrive in completion order.
    fn on_page_normalized(&self, index: usize, total_pages: usize) {
        let _ = (index, total_pages);
    }

    /// Called once after the output document is serialised.
    fn on_flatten_complete(&self, page_count: usize, output_bytes: usize) {
        let _ = (page_count, output_bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FlattenProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FlattenConfig`].
pub type ProgressCallback = Arc<dyn FlattenProgressCallback>;
