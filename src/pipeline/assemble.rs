//! Output assembly: ordered page images in, one PDF byte buffer out.
//!
//! Each emitted page is sized to its image in pixels, one pixel per PDF
//! point, and the image is drawn full-bleed at the origin. The writer sits
//! behind [`OutputWriter`] / [`OutputDocument`] so tests can record calls
//! instead of producing bytes; [`LopdfWriter`] is the real implementation.

use crate::error::DarkPdfError;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;
use tracing::{debug, info};

/// Error raised by an output backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct WriterError(pub String);

impl From<lopdf::Error> for WriterError {
    fn from(e: lopdf::Error) -> Self {
        WriterError(e.to_string())
    }
}

/// Creates empty output documents.
pub trait OutputWriter: Send + Sync {
    fn new_document(&self) -> Box<dyn OutputDocument>;
}

/// A document being built page by page.
pub trait OutputDocument: Send {
    /// Start a new page of `width` × `height` points; later draws target it.
    fn add_page(&mut self, width: u32, height: u32) -> Result<(), WriterError>;

    /// Draw `image` at its pixel size with its top-left corner at (`x`, `y`),
    /// measured from the top-left of the current page.
    fn draw_image(&mut self, image: &DynamicImage, x: u32, y: u32) -> Result<(), WriterError>;

    /// Finish the document and return its bytes.
    fn serialize(self: Box<Self>) -> Result<Vec<u8>, WriterError>;
}

/// Default page size for a fresh document, in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: 595,
        height: 842,
    };
}

/// Result of [`assemble`].
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    /// Pages written to the output.
    pub emitted: usize,
    /// Empty slots that were left out.
    pub skipped: usize,
}

/// Write every present page, in slot order, into a new document.
///
/// Empty slots are skipped. A document with no pages at all is an error.
pub fn assemble(
    pages: &[Option<DynamicImage>],
    writer: &dyn OutputWriter,
) -> Result<AssembledDocument, DarkPdfError> {
    let mut document = writer.new_document();
    let mut emitted = 0usize;
    let mut skipped = 0usize;

    for (index, slot) in pages.iter().enumerate() {
        let Some(image) = slot else {
            debug!("Slot {} is empty, skipping", index + 1);
            skipped += 1;
            continue;
        };
        let page_failed = |e: WriterError| DarkPdfError::AssemblyFailed {
            detail: format!("page {}: {}", index + 1, e),
        };
        document
            .add_page(image.width(), image.height())
            .map_err(page_failed)?;
        document.draw_image(image, 0, 0).map_err(page_failed)?;
        emitted += 1;
    }

    if emitted == 0 {
        return Err(DarkPdfError::NothingToAssemble);
    }

    let bytes = document
        .serialize()
        .map_err(|e| DarkPdfError::AssemblyFailed {
            detail: e.to_string(),
        })?;

    info!(
        "Assembled {} pages ({} skipped), {} bytes",
        emitted,
        skipped,
        bytes.len()
    );
    Ok(AssembledDocument {
        bytes,
        emitted,
        skipped,
    })
}

// ── lopdf backend ────────────────────────────────────────────────────────

/// [`OutputWriter`] producing PDF 1.7 through lopdf.
#[derive(Debug, Clone)]
pub struct LopdfWriter {
    compress: bool,
    default_page: PageSize,
}

impl LopdfWriter {
    pub fn new(compress: bool) -> Self {
        Self {
            compress,
            default_page: PageSize::A4,
        }
    }

    pub fn with_default_page(mut self, size: PageSize) -> Self {
        self.default_page = size;
        self
    }
}

impl Default for LopdfWriter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OutputWriter for LopdfWriter {
    fn new_document(&self) -> Box<dyn OutputDocument> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Box::new(LopdfDocument {
            doc,
            pages_id,
            kids: Vec::new(),
            current: None,
            compress: self.compress,
            default_page: self.default_page,
        })
    }
}

struct PendingPage {
    width: u32,
    height: u32,
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

struct LopdfDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    current: Option<PendingPage>,
    compress: bool,
    default_page: PageSize,
}

impl LopdfDocument {
    /// Write the pending page's content stream and page dictionary.
    fn finish_page(&mut self) -> Result<(), WriterError> {
        let Some(page) = self.current.take() else {
            return Ok(());
        };

        let content = Content {
            operations: page.operations,
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box(page.width, page.height),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => page.xobjects,
            },
        });
        self.kids.push(page_id);
        Ok(())
    }
}

impl OutputDocument for LopdfDocument {
    fn add_page(&mut self, width: u32, height: u32) -> Result<(), WriterError> {
        self.finish_page()?;
        self.current = Some(PendingPage {
            width,
            height,
            operations: Vec::new(),
            xobjects: Dictionary::new(),
        });
        Ok(())
    }

    fn draw_image(&mut self, image: &DynamicImage, x: u32, y: u32) -> Result<(), WriterError> {
        let Some(page) = self.current.as_mut() else {
            return Err(WriterError("draw_image called before add_page".into()));
        };

        let rgba = image.to_rgba8();
        let (w, h) = rgba.dimensions();
        let mut rgb = Vec::with_capacity((w as usize) * (h as usize) * 3);
        let mut alpha = Vec::with_capacity((w as usize) * (h as usize));
        for px in rgba.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
            alpha.push(px.0[3]);
        }

        let mut image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(w),
            "Height" => i64::from(h),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
        };
        if alpha.iter().any(|&a| a != u8::MAX) {
            let smask_id = self.doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(w),
                    "Height" => i64::from(h),
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8i64,
                },
                alpha,
            ));
            image_dict.set("SMask", smask_id);
        }
        let image_id = self.doc.add_object(Stream::new(image_dict, rgb));

        let name = format!("Im{}", page.xobjects.len());
        page.xobjects.set(name.as_bytes().to_vec(), image_id);

        // PDF space has its origin at the bottom-left corner.
        let bottom = i64::from(page.height) - i64::from(y) - i64::from(h);
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    i64::from(w).into(),
                    0i64.into(),
                    0i64.into(),
                    i64::from(h).into(),
                    i64::from(x).into(),
                    bottom.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn serialize(mut self: Box<Self>) -> Result<Vec<u8>, WriterError> {
        self.finish_page()?;

        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => media_box(self.default_page.width, self.default_page.height),
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        if self.compress {
            self.doc.compress();
        }

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| WriterError(format!("failed to serialise PDF: {e}")))?;
        debug!("Serialised {} pages into {} bytes", count, buf.len());
        Ok(buf)
    }
}

fn media_box(width: u32, height: u32) -> Vec<Object> {
    vec![0i64.into(), 0i64.into(), i64::from(width).into(), i64::from(height).into()]
}
