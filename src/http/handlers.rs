//! Request handlers.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use crate::error::ApiError;
use crate::http::request::RequestId;
use crate::http::response::markdown_attachment;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::pipeline::OcrRequest;
use crate::security::limits::too_large_message;
use crate::security::proxy::ClientIp;

const FILE_FIELD: &str = "file";
const ENGINE_FIELD: &str = "engine";

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn not_found() -> Response {
    ApiError::NotFound.into_response()
}

pub async fn method_not_allowed() -> Response {
    ApiError::MethodNotAllowed.into_response()
}

/// `POST /ocr`: accept one document and answer with its markdown transcript.
pub async fn ocr(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    client_ip: Option<Extension<ClientIp>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id
        .map(|Extension(id)| id)
        .unwrap_or_else(RequestId::generate);
    let client_ip = client_ip.map(|Extension(ip)| ip).unwrap_or_default();

    let result = async {
        let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let form = UploadForm::read(multipart, state.body_limit).await?;
        let content = form
            .content
            .ok_or_else(|| ApiError::BadRequest("No file provided.".into()))?;

        state
            .orchestrator
            .process(OcrRequest {
                request_id: request_id.clone(),
                client_ip,
                filename: form.filename,
                content,
                engine: form.engine,
            })
            .await
    }
    .await;

    let response = match result {
        Ok(outcome) => markdown_attachment(outcome.markdown, &outcome.download_name),
        Err(err) => err.into_response_for(Some(&request_id)),
    };
    metrics::record_request(response.status().as_u16(), start);
    response
}

/// Parts of the multipart body the pipeline cares about.
#[derive(Debug, Default)]
struct UploadForm {
    filename: Option<String>,
    content: Option<Bytes>,
    engine: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart, limit: usize) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(FILE_FIELD) => {
                    form.filename = field.file_name().map(str::to_owned);
                    let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                    form.content = Some(bytes);
                }
                Some(ENGINE_FIELD) => {
                    let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                    let value = value.trim();
                    if !value.is_empty() {
                        form.engine = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(too_large_message(limit))
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}
