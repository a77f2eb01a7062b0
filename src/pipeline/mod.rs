//! Pipeline stages for PDF dark-mode inversion.
//!
//! Each submodule implements one step and can be tested on its own; the
//! rasterizer and the output writer sit behind traits so either backend can
//! be swapped without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ scale ──▶ invert ──▶ coordinator ──▶ assemble
//! (path)    (pdfium)      (cubic)   (255-c)    (ordered)        (lopdf)
//!           └──────────── worker ────────────┘
//! ```
//!
//! 1. [`input`]: validate a path, stage uploaded bytes, batch naming
//! 2. [`rasterize`]: open a document and render single pages
//! 3. [`scale`]: optional Catmull-Rom resampling
//! 4. [`invert`]: colour inversion, alpha preserved
//! 5. [`worker`]: one page through rasterize → scale → invert
//! 6. [`coordinator`]: bounded concurrency, first-error-wins, page order
//! 7. [`assemble`]: one output page per image, serialised to PDF bytes

pub mod assemble;
pub mod coordinator;
pub mod input;
pub mod invert;
pub mod rasterize;
pub mod scale;
pub mod worker;
