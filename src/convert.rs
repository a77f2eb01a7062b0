//! Whole-document inversion entry points.
//!
//! Every entry point funnels into [`invert_with`], which takes an already
//! opened [`Document`] and an [`OutputWriter`]. The path- and byte-based
//! helpers only add input validation and the pdfium / lopdf defaults, so
//! tests and the HTTP service can inject their own backends.

use crate::config::InversionConfig;
use crate::error::DarkPdfError;
use crate::output::{InversionOutput, InversionStats};
use crate::pipeline::assemble::{assemble, LopdfWriter, OutputWriter};
use crate::pipeline::coordinator::PagePipeline;
use crate::pipeline::input;
use crate::pipeline::rasterize::{Document, PdfiumRasterizer, Rasterizer};
use crate::pipeline::worker::PageWorker;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Invert the PDF at `path` using pdfium and the lopdf writer.
///
/// # Errors
/// Open failures (missing file, not a PDF, wrong password) are returned
/// before any page is rendered. After that, the first page failure or an
/// assembly failure ends the run; no partial document is ever returned.
///
/// # Example
/// ```rust,no_run
/// use darkpdf::{invert_document, InversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InversionConfig::default();
/// let output = invert_document("paper.pdf", &config).await?;
/// std::fs::write("paper_dark.pdf", &output.pdf)?;
/// eprintln!("{} pages", output.stats.emitted_pages);
/// # Ok(())
/// # }
/// ```
pub async fn invert_document(
    path: impl AsRef<Path>,
    config: &InversionConfig,
) -> Result<InversionOutput, DarkPdfError> {
    let rasterizer: Arc<dyn Rasterizer> = PdfiumRasterizer::shared()?;
    let writer: Arc<dyn OutputWriter> = Arc::new(LopdfWriter::new(config.compress_output));
    invert_path_with(rasterizer, writer, path, config).await
}

/// Invert PDF bytes held in memory.
///
/// pdfium needs a file path, so `bytes` are staged in a [`tempfile`] that is
/// removed again when this function returns.
pub async fn invert_bytes(
    bytes: &[u8],
    config: &InversionConfig,
) -> Result<InversionOutput, DarkPdfError> {
    let rasterizer: Arc<dyn Rasterizer> = PdfiumRasterizer::shared()?;
    let writer: Arc<dyn OutputWriter> = Arc::new(LopdfWriter::new(config.compress_output));
    invert_bytes_with(rasterizer, writer, bytes, config).await
}

/// Like [`invert_bytes`], with injected backends.
pub async fn invert_bytes_with(
    rasterizer: Arc<dyn Rasterizer>,
    writer: Arc<dyn OutputWriter>,
    bytes: &[u8],
    config: &InversionConfig,
) -> Result<InversionOutput, DarkPdfError> {
    let staged = input::stage_bytes(bytes)?;
    // `staged` is dropped (and the file deleted) after the run
    invert_path_with(rasterizer, writer, staged.path(), config).await
}

/// Invert the PDF at `input` and write the result to `output`.
///
/// The output is written to a sibling `.pdf.tmp` file and renamed into
/// place, so a failed run never leaves a truncated PDF behind.
pub async fn invert_to_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &InversionConfig,
) -> Result<InversionStats, DarkPdfError> {
    let result = invert_document(input, config).await?;
    write_atomic(output.as_ref(), &result.pdf).await?;
    Ok(result.stats)
}

/// Synchronous wrapper around [`invert_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn invert_sync(
    path: impl AsRef<Path>,
    config: &InversionConfig,
) -> Result<InversionOutput, DarkPdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DarkPdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(invert_document(path, config))
}

/// Validate `path`, open it with `rasterizer`, then run [`invert_with`].
pub async fn invert_path_with(
    rasterizer: Arc<dyn Rasterizer>,
    writer: Arc<dyn OutputWriter>,
    path: impl AsRef<Path>,
    config: &InversionConfig,
) -> Result<InversionOutput, DarkPdfError> {
    let path = path.as_ref().to_path_buf();
    info!("Starting inversion: {}", path.display());
    input::validate_pdf(&path)?;

    let open_config = config.clone();
    let document = tokio::task::spawn_blocking(move || rasterizer.open(&path, &open_config))
        .await
        .map_err(|e| DarkPdfError::Internal(format!("open task failed: {e}")))??;

    invert_with(document, writer, config).await
}

/// Run the page pipeline over an opened document and assemble the result.
///
/// The document handle is released as soon as the last page has been
/// collected, before assembly starts.
pub async fn invert_with(
    document: Arc<dyn Document>,
    writer: Arc<dyn OutputWriter>,
    config: &InversionConfig,
) -> Result<InversionOutput, DarkPdfError> {
    let total_start = Instant::now();
    let total_pages = document.page_count();
    if total_pages == 0 {
        return Err(DarkPdfError::EmptyDocument);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_inversion_start(total_pages);
    }

    // ── Pages ────────────────────────────────────────────────────────────
    let pipeline = PagePipeline::from_config(config);
    let worker = PageWorker::new(document, config.scale_factor)
        .with_progress(config.progress_callback.clone());

    let pipeline_start = Instant::now();
    let result = pipeline.run(total_pages, move |index| worker.process(index)).await;
    let pipeline_duration_ms = pipeline_start.elapsed().as_millis() as u64;
    let pages = result?;
    debug!("Pipeline stats: {:?}", pages.stats);

    // ── Assembly ─────────────────────────────────────────────────────────
    let assembly_start = Instant::now();
    let slots = pages.pages;
    let assembled = tokio::task::spawn_blocking(move || assemble(&slots, writer.as_ref()))
        .await
        .map_err(|e| DarkPdfError::Internal(format!("assembly task failed: {e}")))??;
    let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;

    let stats = InversionStats {
        total_pages,
        emitted_pages: assembled.emitted,
        skipped_pages: assembled.skipped,
        peak_in_flight: pages.stats.peak_in_flight,
        concurrency: pipeline.concurrency(),
        scale_factor: config.scale_factor,
        output_bytes: assembled.bytes.len(),
        pipeline_duration_ms,
        assembly_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Inversion complete: {}/{} pages, {} bytes, {}ms total",
        stats.emitted_pages, total_pages, stats.output_bytes, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_inversion_complete(total_pages, assembled.emitted);
    }

    Ok(InversionOutput {
        pdf: assembled.bytes,
        stats,
    })
}

/// Write `bytes` to `path` through a temp file + rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DarkPdfError> {
    let write_failed = |e: std::io::Error| DarkPdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingPagePolicy;
    use crate::error::PageError;
    use crate::progress::{InversionProgressCallback, ProgressCallback};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages(Vec<(u32, u32)>);

    impl Document for Pages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn render_page(&self, index: usize) -> Result<DynamicImage, PageError> {
            let (w, h) = self.0[index];
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                w,
                h,
                Rgba([255, 255, 255, 255]),
            )))
        }
    }

    #[derive(Default)]
    struct Counts {
        started: AtomicUsize,
        completed_pages: AtomicUsize,
        finished: AtomicUsize,
    }

    impl InversionProgressCallback for Counts {
        fn on_inversion_start(&self, _total: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _p: usize, _t: usize, _w: u32, _h: u32) {
            self.completed_pages.fetch_add(1, Ordering::SeqCst);
        }
        fn on_inversion_complete(&self, _total: usize, success: usize) {
            self.finished.store(success, Ordering::SeqCst);
        }
    }

    fn writer() -> Arc<dyn OutputWriter> {
        Arc::new(LopdfWriter::new(false))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stats_and_progress_are_reported() {
        let counts = Arc::new(Counts::default());
        let config = InversionConfig::builder()
            .scale_factor(1.0)
            .concurrency(2)
            .progress_callback(counts.clone() as ProgressCallback)
            .build()
            .unwrap();

        let out = invert_with(Arc::new(Pages(vec![(20, 30), (30, 20), (20, 30)])), writer(), &config)
            .await
            .unwrap();

        assert!(out.pdf.starts_with(b"%PDF"));
        assert_eq!(out.stats.total_pages, 3);
        assert_eq!(out.stats.emitted_pages, 3);
        assert_eq!(out.stats.concurrency, 2);
        assert!(out.stats.peak_in_flight <= 2);
        assert_eq!(out.stats.output_bytes, out.pdf.len());
        assert_eq!(counts.started.load(Ordering::SeqCst), 1);
        assert_eq!(counts.completed_pages.load(Ordering::SeqCst), 3);
        assert_eq!(counts.finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let err = invert_with(Arc::new(Pages(vec![])), writer(), &InversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DarkPdfError::EmptyDocument));
    }

    #[tokio::test]
    async fn skipped_pages_are_counted() {
        let config = InversionConfig::builder()
            .missing_pages(MissingPagePolicy::Skip)
            .scale_factor(1.0)
            .build()
            .unwrap();
        let out = invert_with(Arc::new(Pages(vec![(4, 4), (0, 0)])), writer(), &config)
            .await
            .unwrap();
        assert_eq!(out.stats.emitted_pages, 1);
        assert_eq!(out.stats.skipped_pages, 1);
    }

    #[tokio::test]
    async fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.pdf");
        write_atomic(&target, b"%PDF-1.7").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.7");
        assert!(!target.with_extension("pdf.tmp").exists());
    }

    #[tokio::test]
    async fn path_entry_point_validates_before_opening() {
        struct Unreachable;
        impl Rasterizer for Unreachable {
            fn open(&self, _: &Path, _: &InversionConfig) -> Result<Arc<dyn Document>, DarkPdfError> {
                panic!("open must not be called for an invalid input");
            }
        }

        let err = invert_path_with(
            Arc::new(Unreachable),
            writer(),
            "/no/such/file.pdf",
            &InversionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_open_error());
    }
}
