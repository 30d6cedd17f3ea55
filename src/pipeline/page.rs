//! Per-page processing: route, rasterise, encode, infer, time.
//!
//! ## Return Value
//!
//! [`PageProcessor::process`] always returns a `PageResult`. It never
//! propagates the error upward, so a single bad page doesn't abort the
//! whole document. Callers check `result.error` to tell failures apart.

use super::{encode, render::Rasterizer};
use crate::error::PageError;
use crate::inference::{InferenceClient, Route, VisionRequest};
use crate::job::JobSource;
use crate::output::{Extraction, PageResult};
use crate::prompts::extraction_prompt;
use crate::synthetic;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Turns one page of a document into a [`PageResult`].
#[derive(Clone)]
pub struct PageProcessor {
    client: Arc<InferenceClient>,
    rasterizer: Arc<dyn Rasterizer>,
}

impl PageProcessor {
    pub fn new(client: Arc<InferenceClient>, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { client, rasterizer }
    }

    pub fn client(&self) -> &Arc<InferenceClient> {
        &self.client
    }

    pub fn rasterizer(&self) -> &Arc<dyn Rasterizer> {
        &self.rasterizer
    }

    /// Process `page_number` (1-based), routing afresh for this page.
    pub async fn process(&self, source: &JobSource, page_number: u32) -> PageResult {
        let start = Instant::now();
        match self.client.route().await {
            Ok(route) => self.process_routed(source, page_number, route).await,
            Err(e) => {
                warn!("Page {}: {}", page_number, e);
                PageResult::failed(
                    page_number,
                    &source.fields,
                    PageError::from_extract(page_number, &e),
                    start.elapsed().as_secs_f64(),
                )
            }
        }
    }

    /// Process `page_number` with a route decided by the caller.
    pub async fn process_routed(
        &self,
        source: &JobSource,
        page_number: u32,
        route: Route,
    ) -> PageResult {
        let start = Instant::now();
        let outcome = match route {
            Route::Synthetic(_) => Ok(synthetic::extraction(&source.fields, page_number)),
            Route::Live => self.live(source, page_number).await,
        };
        let processing_time = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Extraction { data, source: origin }) => {
                debug!(
                    "Page {}: {} fields from {:?} in {:.2}s",
                    page_number,
                    data.len(),
                    origin,
                    processing_time
                );
                PageResult {
                    page_number,
                    extracted_data: data,
                    processing_time,
                    source: origin,
                    error: None,
                }
            }
            Err(err) => {
                warn!("Page {}: {}", page_number, err);
                PageResult::failed(page_number, &source.fields, err, processing_time)
            }
        }
    }

    async fn live(&self, source: &JobSource, page_number: u32) -> Result<Extraction, PageError> {
        let image = self
            .rasterizer
            .render_page(source.bytes.clone(), page_number)
            .await
            .map_err(|e| PageError::from_extract(page_number, &e))?;

        let image_data_url =
            encode::encode_page(&image).map_err(|e| PageError::EncodeFailed {
                page: page_number,
                detail: e.to_string(),
            })?;

        let request = VisionRequest {
            prompt: extraction_prompt(&source.fields),
            image_data_url,
            options: source.options,
        };

        self.client
            .infer(&request, &source.fields, page_number)
            .await
            .map_err(|e| PageError::from_extract(page_number, &e))
    }
}
