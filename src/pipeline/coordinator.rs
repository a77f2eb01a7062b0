//! Bounded fan-out over pages, index-addressed fan-in of the results.
//!
//! ## Admission
//!
//! Every page gets its own task, but a task only starts rasterising after it
//! holds a permit from a [`Semaphore`] sized to the concurrency ceiling. The
//! permit moves into the `spawn_blocking` closure and is released when the
//! page is done. Admission is continuous: a finished page frees its slot for
//! the next one immediately, and at most `concurrency` decoded bitmaps are
//! alive at once.
//!
//! ## Collection
//!
//! `JoinSet::join_next` yields results in completion order. Each one is
//! written to slot `index` of a vector sized to the page count; every slot is
//! written at most once, by the collector alone. The loop ends when the set
//! is empty, i.e. every spawned task has resolved.
//!
//! ## Failure
//!
//! Only the first error is kept. Under [`FailurePolicy::CancelOnFirstError`]
//! the failing worker closes the semaphore before giving back its permit:
//! no further page is admitted, waiting tasks resolve as cancelled, and
//! pages already running finish and are discarded. Under
//! [`FailurePolicy::CompleteAll`] every page is still attempted. In both
//! cases no images are returned once an error was seen. A panic inside
//! `render` counts as that page's error.

use crate::config::{FailurePolicy, InversionConfig, MissingPagePolicy};
use crate::error::{DarkPdfError, PageError};
use crate::output::PageResult;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Coordinates the page workers of one document.
#[derive(Debug, Clone)]
pub struct PagePipeline {
    concurrency: usize,
    failure_policy: FailurePolicy,
    missing_pages: MissingPagePolicy,
}

/// Ordered pages plus counters from one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// `pages[i]` is source page `i`; `None` only for pages skipped under
    /// [`MissingPagePolicy::Skip`].
    pub pages: Vec<Option<DynamicImage>>,
    pub stats: PipelineStats,
}

/// Counters collected while draining the page tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Pages whose worker actually ran.
    pub attempted: usize,
    /// Pages that produced an inverted image.
    pub succeeded: usize,
    /// Pages whose worker returned an error or panicked.
    pub failed: usize,
    /// Pages never admitted because an earlier page failed.
    pub cancelled: usize,
    /// Pages that rendered to an empty raster.
    pub missing: usize,
    /// Most workers observed running at the same time.
    pub peak_in_flight: usize,
}

/// How a single page task ended.
enum TaskOutcome {
    Finished(usize, Result<PageResult, PageError>),
    Cancelled(usize),
}

impl PagePipeline {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            failure_policy: FailurePolicy::default(),
            missing_pages: MissingPagePolicy::default(),
        }
    }

    pub fn from_config(config: &InversionConfig) -> Self {
        Self::new(config.concurrency)
            .failure_policy(config.failure_policy)
            .missing_pages(config.missing_pages)
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn missing_pages(mut self, policy: MissingPagePolicy) -> Self {
        self.missing_pages = policy;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `render` for every index in `0..page_count` and collect the
    /// results in page order.
    ///
    /// `render` is called on the blocking thread pool, never more than
    /// `concurrency` times at once, and at most once per index.
    pub async fn run<F>(&self, page_count: usize, render: F) -> Result<PipelineOutput, DarkPdfError>
    where
        F: Fn(usize) -> Result<PageResult, PageError> + Send + Sync + 'static,
    {
        if page_count == 0 {
            return Err(DarkPdfError::EmptyDocument);
        }
        info!(
            "Processing {} pages with concurrency {} ({:?})",
            page_count, self.concurrency, self.failure_policy
        );

        let render = Arc::new(render);
        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let gauge = Arc::new(InFlightGauge::default());
        let mut tasks = JoinSet::new();

        for index in 0..page_count {
            let render = Arc::clone(&render);
            let limiter = Arc::clone(&limiter);
            let gauge = Arc::clone(&gauge);
            let policy = self.clone();

            tasks.spawn(async move {
                let permit = match Arc::clone(&limiter).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return TaskOutcome::Cancelled(index),
                };

                let joined = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let _slot = gauge.enter();
                    // Caught here so the limiter is closed before the permit drops.
                    let result = panic::catch_unwind(AssertUnwindSafe(|| (*render)(index)))
                        .unwrap_or_else(|payload| {
                            Err(PageError::WorkerPanicked {
                                page: index,
                                detail: panic_message(&*payload),
                            })
                        });
                    if policy.stops_admission(&result) {
                        limiter.close();
                    }
                    result
                })
                .await;

                let result = joined.unwrap_or_else(|e| {
                    Err(PageError::WorkerPanicked {
                        page: index,
                        detail: e.to_string(),
                    })
                });
                TaskOutcome::Finished(index, result)
            });
        }

        let mut slots: Vec<Option<DynamicImage>> = vec![None; page_count];
        let mut first_error: Option<DarkPdfError> = None;
        let mut stats = PipelineStats::default();

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.record_failure(
                        &mut first_error,
                        DarkPdfError::Internal(format!("page task failed: {e}")),
                        &limiter,
                    );
                    continue;
                }
            };

            match outcome {
                TaskOutcome::Cancelled(index) => {
                    stats.cancelled += 1;
                    debug!("Page {} cancelled", index + 1);
                }
                TaskOutcome::Finished(index, Err(e)) => {
                    stats.attempted += 1;
                    stats.failed += 1;
                    warn!("Page {} failed: {}", index + 1, e);
                    self.record_failure(&mut first_error, e.into(), &limiter);
                }
                TaskOutcome::Finished(index, Ok(result)) => {
                    stats.attempted += 1;
                    if result.index != index {
                        self.record_failure(
                            &mut first_error,
                            DarkPdfError::Internal(format!(
                                "worker for page {} reported index {}",
                                index + 1,
                                result.index + 1
                            )),
                            &limiter,
                        );
                        continue;
                    }
                    match result.image {
                        Some(image) => {
                            stats.succeeded += 1;
                            slots[index] = Some(image);
                        }
                        None => {
                            stats.missing += 1;
                            if self.missing_pages == MissingPagePolicy::Abort {
                                self.record_failure(
                                    &mut first_error,
                                    DarkPdfError::PageMissing { page: index },
                                    &limiter,
                                );
                            } else {
                                warn!("Page {} skipped: empty raster", index + 1);
                            }
                        }
                    }
                }
            }
        }

        stats.peak_in_flight = gauge.peak();
        debug!("Pipeline finished: {:?}", stats);

        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(PipelineOutput {
            pages: slots,
            stats,
        })
    }

    /// True when `result` must end admission of further pages.
    fn stops_admission(&self, result: &Result<PageResult, PageError>) -> bool {
        if self.failure_policy != FailurePolicy::CancelOnFirstError {
            return false;
        }
        match result {
            Err(_) => true,
            Ok(page) => page.image.is_none() && self.missing_pages == MissingPagePolicy::Abort,
        }
    }

    /// Keep the first error; later ones are dropped.
    fn record_failure(&self, slot: &mut Option<DarkPdfError>, err: DarkPdfError, limiter: &Semaphore) {
        if self.failure_policy == FailurePolicy::CancelOnFirstError {
            limiter.close();
        }
        if slot.is_none() {
            *slot = Some(err);
        } else {
            debug!("Discarding later error: {}", err);
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Counts workers currently inside the render call.
#[derive(Default)]
struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<InFlightGauge>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    /// A 1-pixel-high image whose width encodes the page index.
    fn page_image(index: usize) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            index as u32 + 1,
            1,
            Rgba([0, 0, 0, 255]),
        ))
    }

    fn ok_page(index: usize) -> Result<PageResult, PageError> {
        Ok(PageResult {
            index,
            image: Some(page_image(index)),
        })
    }

    fn failed(index: usize) -> Result<PageResult, PageError> {
        Err(PageError::RenderFailed {
            page: index,
            detail: "synthetic failure".into(),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn preserves_page_order_under_reverse_completion() {
        let n = 12;
        let out = PagePipeline::new(3)
            .run(n, move |i| {
                // Early pages are the slowest, so completion order is roughly reversed.
                std::thread::sleep(Duration::from_millis(((n - i) * 3) as u64));
                ok_page(i)
            })
            .await
            .unwrap();

        assert_eq!(out.pages.len(), n);
        for (i, page) in out.pages.iter().enumerate() {
            assert_eq!(page.as_ref().unwrap().width(), i as u32 + 1, "slot {i}");
        }
        assert_eq!(out.stats.succeeded, n);
        assert_eq!(out.stats.attempted, n);
    }

    #[tokio::test]
    async fn zero_pages_is_an_error() {
        let err = PagePipeline::new(2).run(0, ok_page).await.unwrap_err();
        assert!(matches!(err, DarkPdfError::EmptyDocument));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_failure_fails_the_document() {
        let err = PagePipeline::new(2)
            .run(5, |i| if i == 2 { failed(i) } else { ok_page(i) })
            .await
            .unwrap_err();
        match err {
            DarkPdfError::PageRender(PageError::RenderFailed { page, .. }) => assert_eq!(page, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_on_first_error_stops_admission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = PagePipeline::new(1)
            .run(20, move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                failed(i)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DarkPdfError::PageRender(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn complete_all_attempts_every_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = PagePipeline::new(3)
            .failure_policy(FailurePolicy::CompleteAll)
            .run(20, move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                if i % 4 == 1 {
                    failed(i)
                } else {
                    ok_page(i)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DarkPdfError::PageRender(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn missing_page_aborts_by_default() {
        let err = PagePipeline::new(2)
            .run(4, |i| {
                if i == 3 {
                    Ok(PageResult { index: i, image: None })
                } else {
                    ok_page(i)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DarkPdfError::PageMissing { page: 3 }));
    }

    #[tokio::test]
    async fn missing_page_can_be_skipped() {
        let out = PagePipeline::new(2)
            .missing_pages(MissingPagePolicy::Skip)
            .run(4, |i| {
                if i == 1 {
                    Ok(PageResult { index: i, image: None })
                } else {
                    ok_page(i)
                }
            })
            .await
            .unwrap();
        assert!(out.pages[1].is_none());
        assert_eq!(out.pages.iter().flatten().count(), 3);
        assert_eq!(out.stats.missing, 1);
    }

    #[tokio::test]
    async fn panicking_worker_is_reported() {
        let err = PagePipeline::new(2)
            .run(3, |i| {
                if i == 0 {
                    panic!("renderer exploded");
                }
                ok_page(i)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DarkPdfError::PageRender(PageError::WorkerPanicked { page: 0, .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panic_stops_admission_like_an_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = PagePipeline::new(1)
            .run(20, move |_| -> Result<PageResult, PageError> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                panic!("renderer exploded");
            })
            .await
            .unwrap_err();
        match err {
            DarkPdfError::PageRender(PageError::WorkerPanicked { page, detail }) => {
                assert_eq!(page, 0);
                assert_eq!(detail, "renderer exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mismatched_index_is_an_internal_error() {
        let err = PagePipeline::new(1)
            .run(2, |_| ok_page(7))
            .await
            .unwrap_err();
        assert!(matches!(err, DarkPdfError::Internal(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ceiling_is_never_exceeded() {
        let n = 50;
        for c in 1..=n {
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

            let out = PagePipeline::new(c)
                .run(n, move |i| {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_micros(300));
                    a.fetch_sub(1, Ordering::SeqCst);
                    ok_page(i)
                })
                .await
                .unwrap();

            let observed = peak.load(Ordering::SeqCst);
            assert!(observed <= c, "c={c}: {observed} workers ran at once");
            assert!(out.stats.peak_in_flight <= c);
            assert_eq!(out.pages.iter().flatten().count(), n);
        }
    }
}
