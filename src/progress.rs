//! Progress-callback trait for per-page inversion events.
//!
//! Inject an [`Arc<dyn InversionProgressCallback>`] via
//! [`crate::config::InversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline processes each page. The callback can forward
//! events to a terminal progress bar, a log, or a channel without the library
//! knowing how the host application reports progress.
//!
//! # Example
//!
//! ```rust
//! use darkpdf::{InversionConfig, InversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl InversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, width: u32, height: u32) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page_num}/{total_pages} done ({width}x{height})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = InversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn InversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the inversion pipeline as it processes each page.
///
/// Pages run on the blocking thread pool, so `on_page_start`,
/// `on_page_complete` and `on_page_error` may be called concurrently and in
/// any page order. Implementations must protect shared mutable state with
/// `Mutex`, atomics or similar. All methods default to no-ops.
pub trait InversionProgressCallback: Send + Sync {
    /// Called once before any page is admitted.
    fn on_inversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page has been admitted and rasterisation begins.
    ///
    /// * `page_num`: 1-indexed page number
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been rendered, scaled and inverted.
    ///
    /// * `width`, `height`: pixel size of the inverted page, which is also
    ///   its size in the output document
    fn on_page_complete(&self, page_num: usize, total_pages: usize, width: u32, height: u32) {
        let _ = (page_num, total_pages, width, height);
    }

    /// Called when a page fails to render.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the pipeline has joined every page task.
    ///
    /// * `success_count`: pages that produced an inverted image
    fn on_inversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl InversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::InversionConfig`].
pub type ProgressCallback = Arc<dyn InversionProgressCallback>;
