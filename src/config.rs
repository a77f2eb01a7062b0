//! Configuration types for PDF dark-mode inversion.
//!
//! All pipeline behaviour is controlled through [`InversionConfig`], built
//! via its [`InversionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across the worker tasks of a request, logged, and
//! compared between runs.

use crate::error::DarkPdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// Configuration for one inversion run.
///
/// Built via [`InversionConfig::builder()`] or using
/// [`InversionConfig::default()`].
///
/// # Example
/// ```rust
/// use darkpdf::{FailurePolicy, InversionConfig, QualityPreset};
///
/// let config = InversionConfig::builder()
///     .quality(QualityPreset::High)
///     .concurrency(4)
///     .failure_policy(FailurePolicy::CompleteAll)
///     .build()
///     .unwrap();
/// assert_eq!(config.scale_factor, 2.0);
/// ```
#[derive(Clone)]
pub struct InversionConfig {
    /// Resampling factor applied to every rendered page before inversion. Default: 1.5.
    ///
    /// One value for the whole document. `1.0` keeps the rasterizer's
    /// resolution; [`InversionConfigBuilder::build`] rejects values that are
    /// not positive.
    /// See [`QualityPreset`] for the usual reference points.
    pub scale_factor: f32,

    /// Resolution the rasterizer renders at. Range: 36–600. Default: 72.
    ///
    /// At 72 DPI one PDF point becomes one pixel, so `scale_factor` alone
    /// decides the output resolution relative to the source page size.
    pub render_dpi: u32,

    /// Maximum number of pages rasterised and transformed at once.
    /// Default: the number of available CPUs.
    ///
    /// Every in-flight page holds a full decoded bitmap (and a scaled copy),
    /// so this bounds peak memory as much as it bounds CPU use.
    pub concurrency: usize,

    /// What the pipeline does with outstanding pages once one page fails.
    pub failure_policy: FailurePolicy,

    /// What the pipeline does with a page that rendered to an empty raster.
    pub missing_pages: MissingPagePolicy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Flate-compress the streams of the output PDF. Default: true.
    pub compress_output: bool,

    /// Optional progress observer, called from worker threads.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.5,
            render_dpi: 72,
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
            missing_pages: MissingPagePolicy::default(),
            password: None,
            compress_output: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for InversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InversionConfig")
            .field("scale_factor", &self.scale_factor)
            .field("render_dpi", &self.render_dpi)
            .field("concurrency", &self.concurrency)
            .field("failure_policy", &self.failure_policy)
            .field("missing_pages", &self.missing_pages)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("compress_output", &self.compress_output)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn InversionProgressCallback>"),
            )
            .finish()
    }
}

impl InversionConfig {
    /// Create a new builder for `InversionConfig`.
    pub fn builder() -> InversionConfigBuilder {
        InversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Number of processing units on this host, falling back to 1.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Builder for [`InversionConfig`].
#[derive(Debug)]
pub struct InversionConfigBuilder {
    config: InversionConfig,
}

impl InversionConfigBuilder {
    pub fn scale_factor(mut self, factor: f32) -> Self {
        self.config.scale_factor = factor;
        self
    }

    pub fn quality(mut self, preset: QualityPreset) -> Self {
        self.config.scale_factor = preset.scale_factor();
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(36, 600);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn missing_pages(mut self, policy: MissingPagePolicy) -> Self {
        self.config.missing_pages = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn compress_output(mut self, v: bool) -> Self {
        self.config.compress_output = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<InversionConfig, DarkPdfError> {
        let c = &self.config;
        if c.render_dpi < 36 || c.render_dpi > 600 {
            return Err(DarkPdfError::InvalidConfig(format!(
                "DPI must be 36–600, got {}",
                c.render_dpi
            )));
        }
        if !c.scale_factor.is_finite() || c.scale_factor <= 0.0 {
            return Err(DarkPdfError::InvalidConfig(format!(
                "Scale factor must be a positive number, got {}",
                c.scale_factor
            )));
        }
        if c.concurrency == 0 {
            return Err(DarkPdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Named scale factors trading output size against legibility.
///
/// | Preset | Factor | At 72 DPI render |
/// |--------|--------|------------------|
/// | `Low` | 0.5 | ~36 DPI, small file, jagged text |
/// | `Standard` | 1.0 | ~72 DPI, same pixel size as the page |
/// | `High` | 2.0 | ~144 DPI, crisp text |
/// | `Print` | 3.0 | ~216 DPI, very large file |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    Standard,
    High,
    Print,
}

impl QualityPreset {
    pub fn scale_factor(self) -> f32 {
        match self {
            QualityPreset::Low => 0.5,
            QualityPreset::Standard => 1.0,
            QualityPreset::High => 2.0,
            QualityPreset::Print => 3.0,
        }
    }
}

/// How the pipeline reacts to the first page that fails to render.
///
/// Both policies report only the first error and discard every produced
/// image; they differ in how much work is done before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop admitting new pages; let in-flight pages finish and drop them. (default)
    #[default]
    CancelOnFirstError,
    /// Attempt every page even after a failure.
    CompleteAll,
}

/// What to do with a page whose raster came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingPagePolicy {
    /// Fail the whole document with [`DarkPdfError::PageMissing`]. (default)
    #[default]
    Abort,
    /// Leave the page out of the output document.
    Skip,
}
