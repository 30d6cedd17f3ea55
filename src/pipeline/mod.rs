//! Pipeline stages for turning one PDF page into extracted fields.
//!
//! One submodule per step. Rendering sits behind the [`Rasterizer`] trait
//! so tests run the rest of the pipeline without pdfium.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (inference) ──▶ postprocess
//! (%PDF)    (pdfium)   (data URL)  (VLM / synthetic) (JSON → fields)
//! ```
//!
//! 1. [`input`]: reject uploads that are not PDFs before a job exists
//! 2. [`render`]: rasterise one page; runs in `spawn_blocking` behind a
//!    semaphore
//! 3. [`encode`]: PNG-encode and base64-wrap the image as a data URL
//! 4. [`postprocess`]: parse the model's content into the requested fields
//!
//! [`page`] ties the stages together for a single page and never fails.

pub mod encode;
pub mod input;
pub mod page;
pub mod postprocess;
pub mod render;

pub use page::PageProcessor;
pub use render::{PdfiumRasterizer, Rasterizer};
