//! Build small PDFs and inspect the ones darkpdf produces, via lopdf.

use flate2::read::ZlibDecoder;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Read;

/// An image XObject pulled out of an output page.
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    /// Decoded `DeviceRGB` samples.
    pub rgb: Vec<u8>,
}

impl PageImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * self.width + x) * 3) as usize;
        [self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]]
    }
}

fn load(bytes: &[u8]) -> Document {
    Document::load_mem(bytes).expect("output is not a parseable PDF")
}

/// lopdf refuses to decode image streams itself, so Flate is undone here.
fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .expect("corrupt FlateDecode image stream");
    out
}

fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// `[x0, y0, x1, y1]` of every page, in page order.
pub fn media_boxes(bytes: &[u8]) -> Vec<[i64; 4]> {
    let doc = load(bytes);
    page_ids(&doc)
        .into_iter()
        .map(|id| {
            let values: Vec<i64> = doc
                .get_dictionary(id)
                .and_then(|d| d.get(b"MediaBox"))
                .and_then(Object::as_array)
                .expect("page without MediaBox")
                .iter()
                .map(|o| o.as_i64().expect("non-integer MediaBox entry"))
                .collect();
            [values[0], values[1], values[2], values[3]]
        })
        .collect()
}

/// The first image drawn on every page, in page order.
pub fn page_images(bytes: &[u8]) -> Vec<PageImage> {
    let doc = load(bytes);
    page_ids(&doc)
        .into_iter()
        .map(|id| {
            let image_id = doc
                .get_dictionary(id)
                .and_then(|d| d.get(b"Resources"))
                .and_then(Object::as_dict)
                .and_then(|r| r.get(b"XObject"))
                .and_then(Object::as_dict)
                .and_then(|x| x.get(b"Im0"))
                .and_then(Object::as_reference)
                .expect("page without /Im0");
            let stream = doc
                .get_object(image_id)
                .and_then(Object::as_stream)
                .expect("Im0 is not a stream");

            let rgb = match stream.dict.get(b"Filter").and_then(Object::as_name) {
                Ok(b"FlateDecode") => inflate(&stream.content),
                Ok(other) => panic!("unexpected image filter {}", String::from_utf8_lossy(other)),
                Err(_) => stream.content.clone(),
            };
            let dim = |key: &[u8]| {
                stream
                    .dict
                    .get(key)
                    .and_then(Object::as_i64)
                    .expect("image without dimensions") as u32
            };
            PageImage {
                width: dim(b"Width"),
                height: dim(b"Height"),
                rgb,
            }
        })
        .collect()
}

/// A PDF with one page per `(width, height)`, white with a black square in
/// the lower-left corner.
pub fn sample_pdf(pages: &[(u32, u32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = pages
        .iter()
        .map(|&(w, h)| {
            let content = b"0 0 0 rg 0 0 20 20 re f".to_vec();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0i64.into(), 0i64.into(), i64::from(w).into(), i64::from(h).into()],
                "Contents" => content_id,
                "Resources" => dictionary! {},
            });
            Object::Reference(page_id)
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save sample PDF");
    buf
}
