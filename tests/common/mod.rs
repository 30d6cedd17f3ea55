//! Shared fakes for the integration tests: a rasteriser that never touches
//! pdfium and a scriptable inference backend.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_extract::{
    BackendError, ExtractError, ExtractionField, FallbackPolicy, InferenceBackend,
    InferenceClient, InferenceOptions, JobUpload, PollConfig, PollResponse, Rasterizer,
    RemotePage, ResultSource, StartResult, VisionRequest,
};
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Smallest byte string that passes upload validation.
pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n%fake\n";

pub fn fields() -> Vec<ExtractionField> {
    vec![
        ExtractionField::new("drawing_number", "Sheet number in the title block"),
        ExtractionField::new("revision", "Latest revision letter"),
    ]
}

pub fn upload() -> JobUpload {
    JobUpload {
        bytes: Arc::from(PDF_BYTES),
        filename: "drawing.pdf".into(),
        fields: fields(),
        options: InferenceOptions::default(),
    }
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        deadline: Duration::from_millis(50),
    }
}

// ── Rasteriser ───────────────────────────────────────────────────────────

/// Renders blank pages of a fixed-size document.
pub struct FakeRasterizer {
    pub pages: u32,
    /// `page_count` fails as if the PDF were corrupt.
    pub unreadable: bool,
    /// `render_page` fails for this page.
    pub broken_page: Option<u32>,
}

impl FakeRasterizer {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            unreadable: false,
            broken_page: None,
        }
    }

    pub fn unreadable() -> Self {
        Self {
            pages: 0,
            unreadable: true,
            broken_page: None,
        }
    }

    pub fn with_broken_page(mut self, page: u32) -> Self {
        self.broken_page = Some(page);
        self
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn page_count(&self, _pdf: Arc<[u8]>) -> Result<u32, ExtractError> {
        if self.unreadable {
            return Err(ExtractError::InvalidDocument {
                detail: "trailer not found".into(),
            });
        }
        Ok(self.pages)
    }

    async fn render_page(
        &self,
        _pdf: Arc<[u8]>,
        page_number: u32,
    ) -> Result<DynamicImage, ExtractError> {
        if page_number == 0 || page_number > self.pages {
            return Err(ExtractError::PageOutOfRange {
                page: page_number,
                total: self.pages,
            });
        }
        if self.broken_page == Some(page_number) {
            return Err(ExtractError::RasterisationFailed {
                page: page_number,
                detail: "bitmap allocation failed".into(),
            });
        }
        Ok(DynamicImage::new_rgb8(8, 8))
    }
}

// ── Backend ──────────────────────────────────────────────────────────────

/// Backend whose health, latency and answers are set by the test.
pub struct MockBackend {
    pub healthy: AtomicBool,
    pub chat_calls: AtomicUsize,
    pub delay: Duration,
    pub reply: Mutex<Result<String, BackendError>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockBackend {
    pub fn healthy() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            chat_calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reply: Mutex::new(Ok(
                r#"```json
{"drawing_number": "DWG-001", "revision": "C"}
```"#
                    .to_string(),
            )),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn down() -> Self {
        let backend = Self::healthy();
        backend.healthy.store(false, Ordering::SeqCst);
        backend
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self, err: BackendError) -> Self {
        *self.reply.lock().unwrap() = Err(err);
        self
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn endpoint(&self) -> &str {
        "http://mock-backend"
    }

    async fn health(&self) -> Result<(), BackendError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Transport("connection refused".into()))
        }
    }

    async fn chat(&self, _request: &VisionRequest) -> Result<String, BackendError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.reply.lock().unwrap().clone()
    }

    async fn start_sequential(
        &self,
        _pdf: Arc<[u8]>,
        filename: &str,
    ) -> Result<StartResult, BackendError> {
        Ok(StartResult {
            processing_id: "remote-1".into(),
            status: "processing".into(),
            result: None,
            estimated_pages: Some(2),
            message: Some(format!("started {filename}")),
            source: ResultSource::Live,
        })
    }

    async fn poll_page(
        &self,
        processing_id: &str,
        page_number: u32,
    ) -> Result<PollResponse, BackendError> {
        Ok(PollResponse::Ready(RemotePage {
            processing_id: processing_id.to_string(),
            page_number,
            status: "completed".into(),
            result: serde_json::json!({ "drawing_number": "DWG-001" }),
            processing_time: 0.5,
            message: None,
            source: ResultSource::Live,
            attempts: 0,
        }))
    }
}

pub fn client(backend: Arc<MockBackend>, policy: FallbackPolicy) -> Arc<InferenceClient> {
    Arc::new(InferenceClient::new(backend, policy, fast_poll()))
}
