//! The unit of concurrent work: one page index in, one inverted page out.

use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::coordinator::panic_message;
use crate::pipeline::invert::invert;
use crate::pipeline::rasterize::Document;
use crate::pipeline::scale::scale;
use crate::progress::ProgressCallback;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rasterises, scales and inverts single pages of one document.
///
/// A worker never retries and never decides what a failure means for the
/// document; it reports the outcome and leaves policy to the coordinator.
pub struct PageWorker {
    document: Arc<dyn Document>,
    scale_factor: f32,
    total_pages: usize,
    progress: Option<ProgressCallback>,
}

impl PageWorker {
    pub fn new(document: Arc<dyn Document>, scale_factor: f32) -> Self {
        let total_pages = document.page_count();
        Self {
            document,
            scale_factor,
            total_pages,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Process page `index`. Blocking.
    ///
    /// A raster with zero width or height yields `image: None`. A panic in
    /// the rasterizer or a transform becomes [`PageError::WorkerPanicked`].
    pub fn process(&self, index: usize) -> Result<PageResult, PageError> {
        let page_num = index + 1;
        if let Some(ref cb) = self.progress {
            cb.on_page_start(page_num, self.total_pages);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.transform(index)))
            .unwrap_or_else(|payload| {
                Err(PageError::WorkerPanicked {
                    page: index,
                    detail: panic_message(&*payload),
                })
            });

        if let Err(ref e) = result {
            warn!("{}", e);
            if let Some(ref cb) = self.progress {
                cb.on_page_error(page_num, self.total_pages, &e.to_string());
            }
        }
        result
    }

    fn transform(&self, index: usize) -> Result<PageResult, PageError> {
        let page_num = index + 1;
        let raster = self.document.render_page(index)?;

        if raster.width() == 0 || raster.height() == 0 {
            warn!("Page {} rendered to an empty raster", page_num);
            return Ok(PageResult { index, image: None });
        }

        let inverted = invert(&scale(raster, self.scale_factor));
        debug!(
            "Inverted page {} → {}x{} px",
            page_num,
            inverted.width(),
            inverted.height()
        );

        if let Some(ref cb) = self.progress {
            cb.on_page_complete(page_num, self.total_pages, inverted.width(), inverted.height());
        }

        Ok(PageResult {
            index,
            image: Some(inverted),
        })
    }
}
