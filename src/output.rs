//! Result types produced by the inversion pipeline.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// What one page worker produced.
///
/// `index` is the only link between a worker and its place in the output;
/// completion order says nothing about page order.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// Zero-based page index in the source document.
    pub index: usize,
    /// The inverted page, or `None` when the page rendered to an empty raster.
    pub image: Option<DynamicImage>,
}

/// The finished dark-mode document plus run statistics.
#[derive(Debug, Clone)]
pub struct InversionOutput {
    /// Serialized output PDF.
    pub pdf: Vec<u8>,
    pub stats: InversionStats,
}

/// Counters and timings for one inversion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InversionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages written to the output document.
    pub emitted_pages: usize,
    /// Pages left out because they rendered empty (`MissingPagePolicy::Skip`).
    pub skipped_pages: usize,
    /// Highest number of pages that were rasterising at the same time.
    pub peak_in_flight: usize,
    /// Concurrency ceiling the pipeline ran with.
    pub concurrency: usize,
    /// Scale factor applied to every page.
    pub scale_factor: f32,
    /// Size of the serialized output in bytes.
    pub output_bytes: usize,
    pub pipeline_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}
