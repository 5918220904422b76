//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the input directory. The CLI
//! uses it to print `Processing a.pdf...` style lines; library callers can
//! forward the events anywhere.
//!
//! # Example
//!
//! ```rust
//! use pdf2fields::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BatchProgressCallback for Printer {
//!     fn on_file_start(&self, _index: usize, _total: usize, filename: &str) {
//!         eprintln!("Processing {filename}...");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each file.
///
/// All methods default to no-ops. With `concurrency > 1` the per-file methods
/// may be called from several tasks at once, so implementations must be
/// `Send + Sync`.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the input directory has been listed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before layout analysis of a file begins. `index` is 1-based.
    fn on_file_start(&self, index: usize, total_files: usize, filename: &str) {
        let _ = (index, total_files, filename);
    }

    /// Called after layout analysis, just before the language-model request.
    fn on_field_extraction_start(&self, filename: &str, markdown_len: usize) {
        let _ = (filename, markdown_len);
    }

    /// Called when a file's record has been produced (success or parse failure).
    fn on_file_complete(&self, index: usize, total_files: usize, filename: &str, success: bool) {
        let _ = (index, total_files, filename, success);
    }

    /// Called when a fatal error hit a file.
    fn on_file_error(&self, index: usize, total_files: usize, filename: &str, error: &str) {
        let _ = (index, total_files, filename, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
