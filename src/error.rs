//! Error types for the darkpdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DarkPdfError`] is **fatal**: the inversion cannot produce a document
//!   (unreadable input, wrong password, a page failed, the writer rejected an
//!   image). Returned as `Err(DarkPdfError)` from the top-level `invert*`
//!   functions.
//!
//! * [`PageError`] means a single page failed inside a worker. The coordinator
//!   keeps the first one it sees and surfaces it wrapped in
//!   [`DarkPdfError::PageRender`]; output is all-or-nothing, so a page error
//!   always ends the document.
//!
//! Page numbers in messages are 1-based; indices stored in the variants are
//! 0-based so they line up with [`crate::output::PageResult::index`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the darkpdf library.
#[derive(Debug, Error)]
pub enum DarkPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document open errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened fine but has no pages to invert.
    #[error("Document has no pages")]
    EmptyDocument,

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The first page-level failure observed by the pipeline.
    #[error("{0}")]
    PageRender(#[from] PageError),

    /// A page produced no raster and the missing-page policy is `Abort`.
    #[error("Page {} produced no image", page + 1)]
    PageMissing { page: usize },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// The output writer rejected a page or failed to serialise.
    #[error("Failed to assemble output document: {detail}")]
    AssemblyFailed { detail: String },

    /// Every slot was empty; an output document needs at least one page.
    #[error("No pages left to assemble")]
    NothingToAssemble,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or set PDFIUM_LIB_PATH to the\n\
directory that contains an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DarkPdfError {
    /// True when the error happened before any page was rendered, i.e. the
    /// source could not be opened at all.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            DarkPdfError::FileNotFound { .. }
                | DarkPdfError::PermissionDenied { .. }
                | DarkPdfError::NotAPdf { .. }
                | DarkPdfError::CorruptPdf { .. }
                | DarkPdfError::PasswordRequired { .. }
                | DarkPdfError::WrongPassword { .. }
        )
    }
}

/// A failure confined to one page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The rasterizer could not produce an image for this page.
    #[error("Page {}: rasterisation failed: {detail}", page + 1)]
    RenderFailed { page: usize, detail: String },

    /// The worker thread panicked while processing this page.
    #[error("Page {}: worker panicked: {detail}", page + 1)]
    WorkerPanicked { page: usize, detail: String },
}

impl PageError {
    /// Zero-based index of the page that failed.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::WorkerPanicked { page, .. } => *page,
        }
    }
}

// ── HTTP errors ──────────────────────────────────────────────────────────

/// Errors returned by the `/convert` handler.
#[cfg(feature = "server")]
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing PDF upload: expected multipart field 'pdf'")]
    MissingUpload,

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Processing failed: {0}")]
    Processing(#[from] DarkPdfError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "server")]
impl ApiError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ApiError::MissingUpload | ApiError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::Processing(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = axum::Json(serde_json::json!({
            "status": status.as_u16(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
