//! Input handling: validate a local PDF, stage uploaded bytes on disk, and
//! resolve batch inputs and output names.
//!
//! pdfium opens documents from a file-system path, so byte inputs (HTTP
//! uploads, `invert_bytes`) are written to a `NamedTempFile` first. The file
//! is deleted when the handle is dropped, even on an early return. The `%PDF`
//! magic is checked up front so callers get a clear error instead of an
//! opaque pdfium failure.

use crate::error::DarkPdfError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Suffix appended to the stem of each converted file in batch mode.
pub const DARK_SUFFIX: &str = "_dark";

/// Check that `path` is a readable regular file starting with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), DarkPdfError> {
    if !path.is_file() {
        return Err(DarkPdfError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(PDF_MAGIC.len());
            f.take(PDF_MAGIC.len() as u64)
                .read_to_end(&mut head)
                .map_err(|e| DarkPdfError::Internal(format!("Failed to read {}: {e}", path.display())))?;
            check_magic(path, &head)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DarkPdfError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(DarkPdfError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated input PDF: {}", path.display());
    Ok(())
}

/// `NotAPdf` unless `head` starts with the full `%PDF` magic. Short input
/// is reported zero-padded.
fn check_magic(path: &Path, head: &[u8]) -> Result<(), DarkPdfError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(magic.len());
    magic[..n].copy_from_slice(&head[..n]);
    Err(DarkPdfError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// Write `bytes` to a temporary `.pdf` file that lives as long as the handle.
pub fn stage_bytes(bytes: &[u8]) -> Result<NamedTempFile, DarkPdfError> {
    let mut file = tempfile::Builder::new()
        .prefix("input-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| DarkPdfError::Internal(format!("Failed to create temp file: {e}")))?;

    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| DarkPdfError::Internal(format!("Failed to write temp file: {e}")))?;

    check_magic(file.path(), bytes)?;

    debug!("Staged {} bytes at {}", bytes.len(), file.path().display());
    Ok(file)
}

/// `report.pdf` → `report_dark.pdf`, next to the input.
pub fn dark_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}{DARK_SUFFIX}.pdf"))
}

/// True for files this tool already produced (`*_dark.pdf`).
pub fn is_dark_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(DARK_SUFFIX))
}

/// All `*.pdf` files directly inside `dir`, excluding earlier outputs,
/// sorted by file name.
pub fn collect_batch_inputs(dir: &Path) -> Result<Vec<PathBuf>, DarkPdfError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DarkPdfError::FileNotFound {
            path: dir.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => DarkPdfError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => DarkPdfError::Internal(format!("Failed to read {}: {e}", dir.display())),
    })?;

    let mut inputs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .filter(|p| !is_dark_output(p))
        .collect();
    inputs.sort();

    debug!("Found {} batch inputs in {}", inputs.len(), dir.display());
    Ok(inputs)
}
