use axum::extract::Multipart;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::job::JobUpload;
use crate::output::ExtractionRequest;
use crate::server::error::ApiError;

/// The `file` part of a multipart upload.
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Arc<[u8]>,
}

/// Read every part of a multipart body, keeping `file` and
/// `extraction_request`. Other parts are ignored; order does not matter.
async fn read_parts(
    multipart: &mut Multipart,
) -> Result<(Option<UploadedFile>, Option<String>), ApiError> {
    let mut file = None;
    let mut request = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("unknown").to_string();
                let data = field.bytes().await?;
                tracing::debug!(filename = %filename, bytes = data.len(), "File data received");
                file = Some(UploadedFile {
                    filename,
                    bytes: Arc::from(data.as_ref()),
                });
            }
            Some("extraction_request") => {
                request = Some(field.text().await?);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring multipart field");
            }
        }
    }

    Ok((file, request))
}

/// Read an upload carrying only a `file` part.
pub async fn read_file(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    let (file, _) = read_parts(multipart).await?;
    file.ok_or_else(|| ApiError::bad_request("No file uploaded"))
}

/// Read a `file` + `extraction_request` upload into a [`JobUpload`].
pub async fn read_extraction(
    multipart: &mut Multipart,
    config: &ServiceConfig,
) -> Result<JobUpload, ApiError> {
    let (file, request) = read_parts(multipart).await?;
    let file = file.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let raw = request.ok_or_else(|| ApiError::bad_request("Missing extraction_request"))?;
    let request = ExtractionRequest::parse(&raw)?;

    Ok(JobUpload {
        options: request.options(config.temperature, config.max_tokens),
        fields: request.fields,
        bytes: file.bytes,
        filename: file.filename,
    })
}
