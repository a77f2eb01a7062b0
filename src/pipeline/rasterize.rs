//! PDF rasterisation behind two narrow traits, with a pdfium implementation.
//!
//! The pipeline only sees [`Rasterizer`] (open a file) and [`Document`]
//! (count pages, render one page). Anything that can turn a page index into
//! a `DynamicImage` can stand in for pdfium: tests use in-memory documents.
//!
//! ## Why a dedicated render thread?
//!
//! pdfium keeps global state: `FPDF_InitLibrary` / `FPDF_DestroyLibrary` are
//! not reentrant and a loaded `PdfDocument` borrows the bindings it came
//! from. [`PdfiumRasterizer`] therefore binds the library once, on its own
//! thread, and every open / render / close is a message to that thread.
//! Page workers block on the reply, so rasterisation is serialised while
//! scaling and inversion still run in parallel on the blocking pool.

use crate::config::InversionConfig;
use crate::error::{DarkPdfError, PageError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use typed_arena::Arena;

/// A paginated source opened for one request.
///
/// Native resources are released when the last handle is dropped, which
/// happens exactly once per opened document.
pub trait Document: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Rasterise page `index` (0-based).
    fn render_page(&self, index: usize) -> Result<DynamicImage, PageError>;
}

/// Opens documents that a [`Document`] can render.
pub trait Rasterizer: Send + Sync {
    /// Open the PDF at `path`, honouring `config.password` and
    /// `config.render_dpi`.
    ///
    /// Blocking; call it from `spawn_blocking` in async code.
    fn open(&self, path: &Path, config: &InversionConfig) -> Result<Arc<dyn Document>, DarkPdfError>;
}

// ── pdfium implementation ────────────────────────────────────────────────

/// Messages understood by the render thread.
enum Command {
    Open {
        path: PathBuf,
        password: Option<String>,
        scale: f32,
        reply: SyncSender<Result<(u64, usize), DarkPdfError>>,
    },
    Render {
        document: u64,
        index: usize,
        reply: SyncSender<Result<DynamicImage, PageError>>,
    },
    Close {
        document: u64,
    },
}

/// [`Rasterizer`] backed by a single pdfium render thread.
///
/// The thread exits once the rasterizer and every document it opened have
/// been dropped.
pub struct PdfiumRasterizer {
    commands: Sender<Command>,
}

impl PdfiumRasterizer {
    /// Bind pdfium and start the render thread.
    ///
    /// `library` may point at the pdfium shared library itself or at the
    /// directory containing it; `None` binds the system library.
    pub fn new(library: Option<PathBuf>) -> Result<Self, DarkPdfError> {
        let (commands, inbox) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), DarkPdfError>>(1);

        std::thread::Builder::new()
            .name("pdfium-render".into())
            .spawn(move || render_thread(library, ready_tx, inbox))
            .map_err(|e| DarkPdfError::Internal(format!("Failed to spawn render thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { commands }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DarkPdfError::PdfiumBindingFailed(
                "render thread exited during startup".into(),
            )),
        }
    }

    /// Bind the library named by `PDFIUM_LIB_PATH`, or the system library.
    pub fn from_env() -> Result<Self, DarkPdfError> {
        let library = std::env::var_os("PDFIUM_LIB_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(library)
    }

    /// Process-wide rasterizer, bound on first use.
    pub fn shared() -> Result<Arc<PdfiumRasterizer>, DarkPdfError> {
        static SHARED: OnceLock<Result<Arc<PdfiumRasterizer>, String>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                PdfiumRasterizer::from_env()
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(DarkPdfError::PdfiumBindingFailed)
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn open(&self, path: &Path, config: &InversionConfig) -> Result<Arc<dyn Document>, DarkPdfError> {
        let (reply, response) = mpsc::sync_channel(1);
        let command = Command::Open {
            path: path.to_path_buf(),
            password: config.password.clone(),
            scale: config.render_dpi as f32 / 72.0,
            reply,
        };
        self.commands
            .send(command)
            .map_err(|_| render_thread_gone())?;
        let (id, page_count) = response.recv().map_err(|_| render_thread_gone())??;

        info!("PDF loaded: {} pages", page_count);
        Ok(Arc::new(PdfiumDocument {
            id,
            page_count,
            commands: self.commands.clone(),
        }))
    }
}

/// A document held open by the render thread.
struct PdfiumDocument {
    id: u64,
    page_count: usize,
    commands: Sender<Command>,
}

impl Document for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, PageError> {
        let closed = || PageError::RenderFailed {
            page: index,
            detail: "pdfium render thread is no longer running".into(),
        };
        let (reply, response) = mpsc::sync_channel(1);
        self.commands
            .send(Command::Render {
                document: self.id,
                index,
                reply,
            })
            .map_err(|_| closed())?;
        response.recv().map_err(|_| closed())?
    }
}

impl Drop for PdfiumDocument {
    fn drop(&mut self) {
        // The thread may already be gone at process exit; nothing to release then.
        let _ = self.commands.send(Command::Close { document: self.id });
    }
}

fn render_thread_gone() -> DarkPdfError {
    DarkPdfError::Internal("pdfium render thread is no longer running".into())
}

/// Owns the pdfium bindings and every open document.
fn render_thread(
    library: Option<PathBuf>,
    ready: SyncSender<Result<(), DarkPdfError>>,
    inbox: Receiver<Command>,
) {
    let pdfium = match bind_pdfium(library.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }
    drop(ready);

    // A loaded document borrows its password, so passwords are interned here
    // and outlive every entry in `documents`.
    let passwords: Arena<String> = Arena::new();
    let mut known_passwords: Vec<&str> = Vec::new();
    let mut documents: HashMap<u64, (PdfDocument<'_>, f32)> = HashMap::new();
    let mut next_id: u64 = 0;

    for command in inbox {
        match command {
            Command::Open {
                path,
                password,
                scale,
                reply,
            } => {
                let password = password.map(|p| intern(&passwords, &mut known_passwords, p));
                let opened = pdfium
                    .load_pdf_from_file(&path, password)
                    .map_err(|e| map_open_error(&path, password.is_some(), e));
                let result = opened.map(|document| {
                    let page_count = document.pages().len() as usize;
                    let id = next_id;
                    next_id += 1;
                    documents.insert(id, (document, scale));
                    debug!("Opened {} as document #{}", path.display(), id);
                    (id, page_count)
                });
                let _ = reply.send(result);
            }
            Command::Render {
                document,
                index,
                reply,
            } => {
                let result = match documents.get(&document) {
                    Some((doc, scale)) => render_one(doc, index, *scale),
                    None => Err(PageError::RenderFailed {
                        page: index,
                        detail: format!("document #{document} is not open"),
                    }),
                };
                let _ = reply.send(result);
            }
            Command::Close { document } => {
                if documents.remove(&document).is_some() {
                    debug!("Closed document #{}", document);
                }
            }
        }
    }

    debug!("pdfium render thread shutting down");
}

/// Store `password` once per distinct value for the life of the render thread.
fn intern<'a>(arena: &'a Arena<String>, known: &mut Vec<&'a str>, password: String) -> &'a str {
    if let Some(&existing) = known.iter().find(|&&p| p == password) {
        return existing;
    }
    let stored: &'a String = arena.alloc(password);
    known.push(stored.as_str());
    stored.as_str()
}

fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, DarkPdfError> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DarkPdfError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn map_open_error(path: &Path, had_password: bool, e: PdfiumError) -> DarkPdfError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            DarkPdfError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            DarkPdfError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        DarkPdfError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn render_one(document: &PdfDocument<'_>, index: usize, scale: f32) -> Result<DynamicImage, PageError> {
    let failed = |detail: String| PageError::RenderFailed { page: index, detail };

    let pages = document.pages();
    let total = pages.len() as usize;
    if index >= total {
        warn!("Page {} is out of range (total={})", index + 1, total);
        return Err(failed(format!("page index out of range (document has {total} pages)")));
    }

    let page = pages.get(index as u16).map_err(|e| failed(format!("{:?}", e)))?;
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_are_stored_once_per_value() {
        let arena = Arena::new();
        let mut known = Vec::new();
        let a = intern(&arena, &mut known, "secret".to_string());
        let b = intern(&arena, &mut known, "other".to_string());
        let c = intern(&arena, &mut known, "secret".to_string());

        assert_eq!((a, b), ("secret", "other"));
        assert!(std::ptr::eq(a, c));
        assert_eq!(known.len(), 2);
        assert_eq!(arena.len(), 2);
    }
}
