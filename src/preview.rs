//! Page previews for uploaded documents.
//!
//! A client uploads a PDF once, learns its page count, then pages through
//! rendered images while deciding what to extract. Documents stay in memory
//! until removed.
//!
//! Ids are a UUID v5 of the document bytes, so uploading the same file
//! twice returns the same id and keeps one copy.

use crate::error::ExtractError;
use crate::pipeline::{encode, input, Rasterizer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Answer to a document upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub pdf_id: String,
    pub page_count: u32,
    pub filename: String,
}

/// One rendered page, as bare base64 PNG.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePreview {
    pub pdf_id: String,
    pub page_number: u32,
    pub image: String,
}

struct StoredDocument {
    bytes: Arc<[u8]>,
    page_count: u32,
}

/// In-memory documents plus the rasteriser that renders them.
pub struct PreviewStore {
    rasterizer: Arc<dyn Rasterizer>,
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl PreviewStore {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            rasterizer,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and store a document, returning its id and page count.
    ///
    /// # Errors
    /// `InvalidDocument` when the upload is not a PDF or cannot be parsed.
    pub async fn register(
        &self,
        bytes: Arc<[u8]>,
        filename: &str,
    ) -> Result<DocumentInfo, ExtractError> {
        input::validate_upload(&bytes, filename)?;
        let page_count = self.rasterizer.page_count(bytes.clone()).await?;
        let pdf_id = document_id(&bytes);

        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pdf_id.clone(), StoredDocument { bytes, page_count });
        info!(pdf_id = %pdf_id, filename, pages = page_count, "Document stored for preview");

        Ok(DocumentInfo {
            pdf_id,
            page_count,
            filename: filename.to_string(),
        })
    }

    /// Render `page_number` of a stored document.
    ///
    /// # Errors
    /// `DocumentNotFound`, `PageOutOfRange`, or the rasteriser's error.
    pub async fn render(&self, pdf_id: &str, page_number: u32) -> Result<PagePreview, ExtractError> {
        let (bytes, total) = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pdf_id)
            .map(|doc| (doc.bytes.clone(), doc.page_count))
            .ok_or_else(|| ExtractError::DocumentNotFound {
                pdf_id: pdf_id.to_string(),
            })?;
        if page_number == 0 || page_number > total {
            return Err(ExtractError::PageOutOfRange {
                page: page_number,
                total,
            });
        }

        let image = self.rasterizer.render_page(bytes, page_number).await?;
        let url = encode::encode_page(&image).map_err(|e| ExtractError::RasterisationFailed {
            page: page_number,
            detail: format!("PNG encoding failed: {e}"),
        })?;
        let image = url
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .map(str::to_string)
            .unwrap_or(url);
        debug!(pdf_id, page = page_number, chars = image.len(), "Page preview rendered");

        Ok(PagePreview {
            pdf_id: pdf_id.to_string(),
            page_number,
            image,
        })
    }

    /// Drop a stored document. Returns whether it existed.
    pub fn remove(&self, pdf_id: &str) -> bool {
        let removed = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(pdf_id)
            .is_some();
        if removed {
            info!(pdf_id, "Preview document removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn document_id(bytes: &[u8]) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, bytes)
        .simple()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::DynamicImage;

    const PDF: &[u8] = b"%PDF-1.7\n%preview\n";

    struct BlankPages(u32);

    #[async_trait]
    impl Rasterizer for BlankPages {
        async fn page_count(&self, _pdf: Arc<[u8]>) -> Result<u32, ExtractError> {
            Ok(self.0)
        }

        async fn render_page(
            &self,
            _pdf: Arc<[u8]>,
            _page_number: u32,
        ) -> Result<DynamicImage, ExtractError> {
            Ok(DynamicImage::new_rgb8(4, 4))
        }
    }

    fn store(pages: u32) -> PreviewStore {
        PreviewStore::new(Arc::new(BlankPages(pages)))
    }

    #[tokio::test]
    async fn same_bytes_share_one_id() {
        let previews = store(2);
        let a = previews.register(Arc::from(PDF), "a.pdf").await.unwrap();
        let b = previews.register(Arc::from(PDF), "b.pdf").await.unwrap();
        assert_eq!(a.pdf_id, b.pdf_id);
        assert_eq!(b.filename, "b.pdf");
        assert_eq!(previews.len(), 1);

        let other = previews
            .register(Arc::from(&b"%PDF-1.4 other"[..]), "c.pdf")
            .await
            .unwrap();
        assert_ne!(other.pdf_id, a.pdf_id);
    }

    #[tokio::test]
    async fn render_returns_bare_base64_png() {
        let previews = store(2);
        let info = previews.register(Arc::from(PDF), "a.pdf").await.unwrap();
        let page = previews.render(&info.pdf_id, 2).await.unwrap();
        assert_eq!(page.page_number, 2);
        let png = STANDARD.decode(&page.image).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[tokio::test]
    async fn render_checks_id_and_range() {
        let previews = store(2);
        let info = previews.register(Arc::from(PDF), "a.pdf").await.unwrap();
        assert!(matches!(
            previews.render(&info.pdf_id, 3).await,
            Err(ExtractError::PageOutOfRange { page: 3, total: 2 })
        ));
        assert!(matches!(
            previews.render("missing", 1).await,
            Err(ExtractError::DocumentNotFound { .. })
        ));

        assert!(previews.remove(&info.pdf_id));
        assert!(!previews.remove(&info.pdf_id));
        assert!(previews.is_empty());
    }
}
