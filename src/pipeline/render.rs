//! PDF rasterisation: page count and page → `DynamicImage` via pdfium.
//!
//! ## Threading
//!
//! pdfium is a synchronous C++ library with global state, so every call
//! runs on the blocking pool. Each call binds the library and opens the
//! document afresh; nothing pdfium-owned crosses an `.await`.
//!
//! [`PdfiumRasterizer`] takes a semaphore permit before each blocking call.
//! Concurrent jobs with full batches therefore hold at most
//! `render_concurrency` decoded documents at once.
//!
//! ## Output size
//!
//! Size follows the configured DPI, but the longest edge never exceeds
//! `max_rendered_pixels`: a large-format drawing is shrunk to the cap
//! instead of rendering at full physical size.

use crate::config::ServiceConfig;
use crate::error::ExtractError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Turns PDF bytes into page images.
///
/// Pure with respect to its inputs: the same bytes and page number always
/// yield the same image. Page numbers are 1-based.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Number of pages in the document. Fails with `InvalidDocument` if the
    /// bytes cannot be parsed or the document is empty.
    async fn page_count(&self, pdf: Arc<[u8]>) -> Result<u32, ExtractError>;

    /// Render one page.
    async fn render_page(&self, pdf: Arc<[u8]>, page_number: u32)
        -> Result<DynamicImage, ExtractError>;
}

/// [`Rasterizer`] backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
    permits: Arc<Semaphore>,
}

impl PdfiumRasterizer {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            lib_path: config.pdfium_lib_path.clone(),
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            permits: Arc::new(Semaphore::new(config.render_concurrency.max(1))),
        }
    }

    /// Bind pdfium once to surface a missing library at startup rather than
    /// on the first upload.
    pub fn probe(&self) -> Result<(), ExtractError> {
        bind(self.lib_path.as_ref()).map(|_| ())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ExtractError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExtractError::Internal(format!("render pool closed: {e}")))?;

        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn page_count(&self, pdf: Arc<[u8]>) -> Result<u32, ExtractError> {
        let lib_path = self.lib_path.clone();
        self.blocking(move || page_count_blocking(lib_path.as_ref(), &pdf))
            .await
    }

    async fn render_page(
        &self,
        pdf: Arc<[u8]>,
        page_number: u32,
    ) -> Result<DynamicImage, ExtractError> {
        let lib_path = self.lib_path.clone();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        self.blocking(move || {
            render_page_blocking(lib_path.as_ref(), &pdf, page_number, dpi, max_pixels)
        })
        .await
    }
}

fn bind(lib_path: Option<&PathBuf>) -> Result<Pdfium, ExtractError> {
    let bindings = match lib_path {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::Configuration(format!("pdfium bind failed: {:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, pdf: &'a [u8]) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| ExtractError::InvalidDocument {
            detail: format!("{:?}", e),
        })
}

/// Blocking implementation of page counting.
fn page_count_blocking(lib_path: Option<&PathBuf>, pdf: &[u8]) -> Result<u32, ExtractError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf)?;
    let total = u32::from(document.pages().len());
    if total == 0 {
        return Err(ExtractError::InvalidDocument {
            detail: "document has no pages".into(),
        });
    }
    info!("PDF loaded: {} pages", total);
    Ok(total)
}

/// Blocking implementation of page rendering.
fn render_page_blocking(
    lib_path: Option<&PathBuf>,
    pdf: &[u8],
    page_number: u32,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, ExtractError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf)?;
    let pages = document.pages();
    let total = u32::from(pages.len());

    if page_number == 0 || page_number > total {
        return Err(ExtractError::PageOutOfRange {
            page: page_number,
            total,
        });
    }

    let page = pages
        .get((page_number - 1) as u16)
        .map_err(|e| ExtractError::RasterisationFailed {
            page: page_number,
            detail: format!("{:?}", e),
        })?;

    let (width, height) = target_size(page.width().value, page.height().value, dpi, max_pixels);
    let render_config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_target_height(height);

    let bitmap = page.render_with_config(&render_config).map_err(|e| {
        ExtractError::RasterisationFailed {
            page: page_number,
            detail: format!("{:?}", e),
        }
    })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_number,
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Pixel size for a page of `width_pt × height_pt` points at `dpi`, with the
/// longest edge capped at `max_pixels`.
fn target_size(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> (i32, i32) {
    let scale = dpi as f32 / 72.0;
    let (mut w, mut h) = (width_pt * scale, height_pt * scale);
    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let shrink = max_pixels as f32 / longest;
        w *= shrink;
        h *= shrink;
    }
    ((w.round() as i32).max(1), (h.round() as i32).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_page_at_150_dpi() {
        // 8.5 × 11 in
        assert_eq!(target_size(612.0, 792.0, 150, 4000), (1275, 1650));
    }

    #[test]
    fn longest_edge_is_capped() {
        // A0 portrait
        let (w, h) = target_size(2384.0, 3370.0, 150, 2000);
        assert_eq!(h, 2000);
        assert!(w < h);
    }

    #[test]
    fn degenerate_page_gets_one_pixel() {
        assert_eq!(target_size(0.0, 0.0, 150, 2000), (1, 1));
    }
}
