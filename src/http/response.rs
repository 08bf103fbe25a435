//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map [`ApiError`] to status codes and JSON bodies
//! - Keep internal causes out of client-visible bodies
//! - Build the markdown download response
//!
//! # Design Decisions
//! - Every error body has the shape `{"detail": "..."}`
//! - 5xx bodies also carry `request_id` so operators can find the log line
//! - 429 responses carry `Retry-After`

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ApiError;
use crate::http::request::RequestId;

pub const INTERNAL_ERROR_DETAIL: &str = "Internal server error.";

/// Marks a 500 produced by the panic catcher. The correlation layer
/// re-renders it once the request id is known.
#[derive(Debug, Clone)]
pub struct HandlerPanic(pub String);

impl IntoResponse for HandlerPanic {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: INTERNAL_ERROR_DETAIL.to_string(),
            request_id: None,
        };
        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Storage { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error, attaching the request id to server-side failures.
    pub fn into_response_for(self, request_id: Option<&RequestId>) -> Response {
        let status = self.status();

        let body = if self.is_internal() {
            tracing::error!(
                request_id = request_id.map(RequestId::as_str).unwrap_or("unknown"),
                error = %self,
                "Unhandled error"
            );
            ErrorBody {
                detail: INTERNAL_ERROR_DETAIL.to_string(),
                request_id: Some(
                    request_id
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                ),
            }
        } else {
            ErrorBody {
                detail: self.to_string(),
                request_id: None,
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_for(None)
    }
}

/// Build the `200 text/markdown` attachment response.
pub fn markdown_attachment(markdown: String, download_name: &str) -> Response {
    // Header values must be visible ASCII.
    let safe_name: String = download_name
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { '_' })
        .filter(|c| *c != '"')
        .collect();

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{safe_name}\"")) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
