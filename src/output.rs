//! Request and result types shared by the pipeline, the client and the API.

use crate::error::{ExtractError, PageError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One field the client wants extracted from every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionField {
    pub field_name: String,
    pub description: String,
}

impl ExtractionField {
    pub fn new(field_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            description: description.into(),
        }
    }
}

/// The `extraction_request` form field of an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub fields: Vec<ExtractionField>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ExtractionRequest {
    /// Parse and validate the JSON form field.
    pub fn parse(raw: &str) -> Result<Self, ExtractError> {
        let request: ExtractionRequest =
            serde_json::from_str(raw).map_err(|e| ExtractError::InvalidRequest(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// At least one field, no blank or duplicate field names.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.fields.is_empty() {
            return Err(ExtractError::InvalidRequest(
                "at least one field is required".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            let name = field.field_name.trim();
            if name.is_empty() {
                return Err(ExtractError::InvalidRequest(
                    "field_name must not be empty".into(),
                ));
            }
            if !seen.insert(name) {
                return Err(ExtractError::InvalidRequest(format!(
                    "duplicate field_name '{name}'"
                )));
            }
        }
        Ok(())
    }

    /// Sampling options, falling back to the service defaults.
    pub fn options(&self, default_temperature: f32, default_max_tokens: u32) -> InferenceOptions {
        InferenceOptions {
            temperature: self
                .temperature
                .unwrap_or(default_temperature)
                .clamp(0.0, 2.0),
            max_tokens: self.max_tokens.unwrap_or(default_max_tokens).max(1),
        }
    }
}

/// Sampling options for one inference call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4000,
        }
    }
}

/// Where a page's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// The inference backend produced it.
    Live,
    /// The synthetic generator produced it.
    Synthetic,
}

/// Field data produced for one page, before timing is attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub data: Map<String, Value>,
    pub source: ResultSource,
}

/// Result for a single page.
///
/// `error` is `Some` when the page failed; `extracted_data` then holds a
/// `null` for every requested field so the schema stays stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: u32,
    /// Requested field → extracted value (`null` when not found).
    pub extracted_data: Map<String, Value>,
    /// Wall-clock seconds spent on this page.
    pub processing_time: f64,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// A failed page with a null-filled field map.
    pub fn failed(
        page_number: u32,
        fields: &[ExtractionField],
        error: PageError,
        processing_time: f64,
    ) -> Self {
        Self {
            page_number,
            extracted_data: null_fields(fields),
            processing_time,
            source: ResultSource::Live,
            error: Some(error),
        }
    }
}

/// A map with every requested field set to `null`.
pub fn null_fields(fields: &[ExtractionField]) -> Map<String, Value> {
    fields
        .iter()
        .map(|f| (f.field_name.clone(), Value::Null))
        .collect()
}

/// Answer to a backend-driven start (`StartExtraction`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResult {
    pub processing_id: String,
    pub status: String,
    /// First page's data when the backend returns it eagerly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "default_live")]
    pub source: ResultSource,
}

fn default_live() -> ResultSource {
    ResultSource::Live
}

/// Answer to a polled backend-driven page (`GetPageResult`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePage {
    pub processing_id: String,
    pub page_number: u32,
    pub status: String,
    pub result: Value,
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "default_live")]
    pub source: ResultSource,
    /// Poll attempts made before the answer was accepted.
    #[serde(default)]
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_applies_defaults() {
        let req =
            ExtractionRequest::parse(r#"{"fields":[{"field_name":"title","description":"doc title"}]}"#)
                .unwrap();
        assert_eq!(req.fields.len(), 1);
        let opts = req.options(0.1, 4000);
        assert_eq!(opts.max_tokens, 4000);
        assert!((opts.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = ExtractionRequest::parse("{fields:").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRequest(_)));
    }

    #[test]
    fn parse_rejects_missing_fields_key() {
        let err = ExtractionRequest::parse(r#"{"temperature":0.2}"#).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRequest(_)));
    }

    #[test]
    fn validate_rejects_empty_and_duplicates() {
        assert!(ExtractionRequest::parse(r#"{"fields":[]}"#).is_err());
        let dup = r#"{"fields":[
            {"field_name":"a","description":"x"},
            {"field_name":"a","description":"y"}]}"#;
        assert!(ExtractionRequest::parse(dup).is_err());
    }

    #[test]
    fn failed_page_keeps_schema() {
        let fields = vec![ExtractionField::new("title", "t"), ExtractionField::new("date", "d")];
        let page = PageResult::failed(
            4,
            &fields,
            PageError::RenderFailed {
                page: 4,
                detail: "boom".into(),
            },
            0.5,
        );
        assert!(page.is_error());
        assert_eq!(page.extracted_data.len(), 2);
        assert!(page.extracted_data["title"].is_null());
    }

    #[test]
    fn page_result_omits_absent_error() {
        let page = PageResult {
            page_number: 1,
            extracted_data: Map::new(),
            processing_time: 0.1,
            source: ResultSource::Synthetic,
            error: None,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["source"], "synthetic");
    }
}
