//! [`InferenceBackend`] over HTTP with reqwest.
//!
//! Speaks the OpenAI chat-completion shape for per-page inference and the
//! backend's `/tbe/sequential` endpoints for backend-driven runs. Every
//! request carries a timeout; health probes use their own shorter one.

use super::backend::{BackendError, InferenceBackend, PollResponse, VisionRequest};
use crate::config::ServiceConfig;
use crate::error::ExtractError;
use crate::output::{RemotePage, ResultSource, StartResult};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// reqwest-backed inference backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    model: String,
    health_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &ServiceConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExtractError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            health_timeout: config.health_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn chat_body(&self, request: &VisionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.prompt },
                        {
                            "type": "image_url",
                            "image_url": { "url": request.image_data_url }
                        }
                    ]
                }
            ],
            "max_tokens": request.options.max_tokens,
            "temperature": request.options.temperature,
            "stream": false
        })
    }
}

fn classify(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(err.to_string())
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// Turn a non-success status into [`BackendError::Status`].
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json(response: Response) -> Result<Value, BackendError> {
    let raw = response.bytes().await.map_err(classify)?;
    serde_json::from_slice(&raw).map_err(|e| {
        error!(raw_response = %String::from_utf8_lossy(&raw), "Failed to parse backend JSON");
        BackendError::Decode(e.to_string())
    })
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Build a [`RemotePage`] from whatever subset of fields the backend sent.
fn remote_page(processing_id: &str, page_number: u32, body: Value) -> RemotePage {
    let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
    let result = body.get("result").unwrap_or(&body).clone();
    RemotePage {
        processing_id: text("processing_id").unwrap_or_else(|| processing_id.to_string()),
        page_number: body
            .get("page_number")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(page_number),
        status: text("status").unwrap_or_else(|| "completed".into()),
        processing_time: body
            .get("processing_time")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        message: text("message"),
        source: ResultSource::Live,
        attempts: 0,
        result,
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(classify)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn chat(&self, request: &VisionRequest) -> Result<String, BackendError> {
        let url = self.url("/v1/chat/completions");
        debug!("POST {} ({} byte image)", url, request.image_data_url.len());

        let response = self
            .client
            .post(&url)
            .json(&self.chat_body(request))
            .send()
            .await
            .map_err(classify)?;
        let body = read_json(ensure_success(response).await?).await?;

        let completion: ChatCompletion =
            serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Decode("completion has no message content".into()))
    }

    async fn start_sequential(
        &self,
        pdf: Arc<[u8]>,
        filename: &str,
    ) -> Result<StartResult, BackendError> {
        let part = multipart::Part::bytes(pdf.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/tbe/sequential/start"))
            .multipart(form)
            .send()
            .await
            .map_err(classify)?;
        let body = read_json(ensure_success(response).await?).await?;
        serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn poll_page(
        &self,
        processing_id: &str,
        page_number: u32,
    ) -> Result<PollResponse, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/tbe/sequential/{processing_id}/{page_number}")))
            .send()
            .await
            .map_err(classify)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(PollResponse::NotReady);
        }
        let body = read_json(ensure_success(response).await?).await?;
        Ok(PollResponse::Ready(remote_page(processing_id, page_number, body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::InferenceOptions;

    #[test]
    fn chat_body_has_openai_shape() {
        let backend = HttpBackend::new(&ServiceConfig::default()).unwrap();
        let body = backend.chat_body(&VisionRequest {
            prompt: "extract".into(),
            image_data_url: "data:image/png;base64,AAAA".into(),
            options: InferenceOptions {
                temperature: 0.2,
                max_tokens: 512,
            },
        });
        assert_eq!(body["model"], "vision-model");
        assert_eq!(body["max_tokens"], 512);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn remote_page_fills_missing_fields() {
        let page = remote_page("abc", 3, json!({"drawing_title": "Roof Plan"}));
        assert_eq!(page.processing_id, "abc");
        assert_eq!(page.page_number, 3);
        assert_eq!(page.status, "completed");
        assert_eq!(page.result["drawing_title"], "Roof Plan");
    }

    #[test]
    fn remote_page_unwraps_result() {
        let page = remote_page(
            "abc",
            1,
            json!({"processing_id":"abc","page_number":1,"status":"completed",
                   "result":{"x":1},"processing_time":1.5}),
        );
        assert_eq!(page.result, json!({"x": 1}));
        assert_eq!(page.processing_time, 1.5);
    }
}
