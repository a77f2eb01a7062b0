//! # darkpdf
//!
//! Turn a PDF into a dark-mode PDF: every page is rasterised, optionally
//! rescaled, colour-inverted and written back as a full-page image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate the path or stage uploaded bytes
//!  ├─ 2. Rasterize  render each page via pdfium (blocking, one render thread)
//!  ├─ 3. Scale      Catmull-Rom resampling by the configured factor
//!  ├─ 4. Invert     255 - c on RGB, alpha untouched
//!  ├─ 5. Collect    bounded concurrency, pages kept in source order
//!  └─ 6. Assemble   one page per image, sized to the image (lopdf)
//! ```
//!
//! Pages are processed concurrently under a ceiling (one permit per page in
//! flight), but the output always follows source order. Output is
//! all-or-nothing: the first failing page fails the document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use darkpdf::{invert_to_file, InversionConfig, QualityPreset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InversionConfig::builder()
//!         .quality(QualityPreset::High)
//!         .concurrency(4)
//!         .build()?;
//!     let stats = invert_to_file("paper.pdf", "paper_dark.pdf", &config).await?;
//!     eprintln!("{} pages in {}ms", stats.emitted_pages, stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `darkpdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `server` | on      | Enables [`server`], the axum upload service |
//!
//! Disable both when using only the library:
//! ```toml
//! darkpdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Quality presets
//!
//! | Preset | Scale | Approx. DPI |
//! |--------|-------|-------------|
//! | `low`      | 0.5 | 36  |
//! | `standard` | 1.0 | 72  |
//! | `high`     | 2.0 | 144 |
//! | `print`    | 3.0 | 216 |
//!
//! The default scale factor is 1.5.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FailurePolicy, InversionConfig, InversionConfigBuilder, MissingPagePolicy, QualityPreset,
};
pub use convert::{
    invert_bytes, invert_bytes_with, invert_document, invert_path_with, invert_sync,
    invert_to_file, invert_with,
};
#[cfg(feature = "server")]
pub use error::ApiError;
pub use error::{DarkPdfError, PageError};
pub use output::{InversionOutput, InversionStats, PageResult};
pub use pipeline::assemble::{LopdfWriter, OutputDocument, OutputWriter, WriterError};
pub use pipeline::coordinator::{PagePipeline, PipelineOutput, PipelineStats};
pub use pipeline::rasterize::{Document, PdfiumRasterizer, Rasterizer};
pub use progress::{InversionProgressCallback, NoopProgressCallback, ProgressCallback};
