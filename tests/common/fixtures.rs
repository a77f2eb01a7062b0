//! In-memory documents and a rasterizer that hands them out.

use darkpdf::{DarkPdfError, Document, InversionConfig, PageError, Rasterizer};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a synthetic page renders to.
#[derive(Debug, Clone)]
pub enum PageSpec {
    /// A `width` × `height` raster filled with one colour.
    Solid { width: u32, height: u32, rgba: [u8; 4] },
    /// Rendering fails.
    Fail,
    /// Rendering yields a zero-size raster.
    Empty,
}

impl PageSpec {
    pub fn white(width: u32, height: u32) -> Self {
        PageSpec::Solid {
            width,
            height,
            rgba: [255, 255, 255, 255],
        }
    }
}

/// A document whose pages are described up front.
pub struct SyntheticDocument {
    pages: Vec<PageSpec>,
    delay: Duration,
    renders: AtomicUsize,
}

impl SyntheticDocument {
    pub fn new(pages: Vec<PageSpec>) -> Self {
        Self {
            pages,
            delay: Duration::ZERO,
            renders: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every render call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl Document for SyntheticDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, PageError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match &self.pages[index] {
            PageSpec::Solid {
                width,
                height,
                rgba,
            } => Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                *width,
                *height,
                Rgba(*rgba),
            ))),
            PageSpec::Fail => Err(PageError::RenderFailed {
                page: index,
                detail: "synthetic page failure".into(),
            }),
            PageSpec::Empty => Ok(DynamicImage::ImageRgba8(RgbaImage::new(0, 0))),
        }
    }
}

/// Opens every path as the same synthetic document.
pub struct FakeRasterizer {
    document: Arc<SyntheticDocument>,
    opened: Mutex<Vec<PathBuf>>,
}

impl FakeRasterizer {
    pub fn new(pages: Vec<PageSpec>) -> Arc<Self> {
        Arc::new(Self {
            document: Arc::new(SyntheticDocument::new(pages)),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn document(&self) -> &SyntheticDocument {
        &self.document
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl Rasterizer for FakeRasterizer {
    fn open(
        &self,
        path: &Path,
        _config: &InversionConfig,
    ) -> Result<Arc<dyn Document>, DarkPdfError> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(self.document.clone())
    }
}
