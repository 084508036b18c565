use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::state::AppState;
use crate::chat::{ChatRequest, UploadedAttachment};
use crate::error::{ChorusError, Result};
use crate::models::{AggregateResponse, MediaType};

const INVALID_FILE_TYPE: &str = "Invalid file type. Supported: JPEG, PNG, GIF, WebP";

/// `POST /api/chat`
///
/// Multipart form with a `prompt` text field and an optional image under
/// `file` (or `mediaFile`). The image is streamed to a temp file, which the
/// aggregator deletes once every provider has answered.
pub async fn chat(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<AggregateResponse>> {
    let mut multipart = multipart
        .map_err(|e| ChorusError::Validation(format!("Invalid multipart form: {}", e.body_text())))?;

    let max_bytes = state.config.upload.max_bytes;
    let mut prompt: Option<String> = None;
    let mut attachment: Option<UploadedAttachment> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "prompt" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                prompt = Some(text);
            }
            "file" | "mediaFile" => {
                // Browsers send an empty part when no file was picked.
                if field.file_name() == Some("") {
                    continue;
                }
                if attachment.is_some() {
                    return Err(ChorusError::Validation(
                        "Only one file may be uploaded per request".to_string(),
                    ));
                }
                attachment = Some(store_upload(&state, field).await?);
            }
            _ => {}
        }
    }

    let prompt = prompt.unwrap_or_default();
    tracing::info!(
        prompt_chars = prompt.chars().count(),
        attachment_bytes = attachment.as_ref().map(UploadedAttachment::size),
        "Chat request received"
    );

    let request = ChatRequest { prompt, attachment };
    let response = state
        .aggregator
        .handle_with_cancel(request, state.shutdown.child_token())
        .await?;

    Ok(Json(response))
}

/// Stream one file part to disk, enforcing type and size as bytes arrive.
async fn store_upload(state: &AppState, mut field: Field<'_>) -> Result<UploadedAttachment> {
    let max_bytes = state.config.upload.max_bytes;
    let content_type = field.content_type().unwrap_or("").to_string();

    if content_type.parse::<MediaType>().is_err() {
        return Err(ChorusError::Validation(INVALID_FILE_TYPE.to_string()));
    }

    let file_name = field.file_name().map(str::to_string);
    let mut attachment =
        UploadedAttachment::create(&state.config.upload.dir, content_type, file_name).await?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if attachment.size() as usize + chunk.len() > max_bytes {
            // Dropping the attachment removes the partial file.
            return Err(file_too_large(max_bytes));
        }
        attachment.append(&chunk).await?;
    }

    Ok(attachment)
}

fn multipart_error(error: MultipartError, max_bytes: usize) -> ChorusError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return file_too_large(max_bytes);
    }
    ChorusError::Validation(format!("Invalid multipart form: {}", error.body_text()))
}

fn file_too_large(max_bytes: usize) -> ChorusError {
    ChorusError::Validation(format!("File too large (max {max_bytes} bytes)"))
}
