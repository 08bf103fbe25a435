//! Request body size limits.
//!
//! # Responsibilities
//! - Reject bodies whose declared `Content-Length` exceeds the limit
//! - Do it before a single body byte is read
//!
//! # Design Decisions
//! - Missing or unparsable `Content-Length` passes; streamed bytes are
//!   bounded separately by `RequestBodyLimitLayer` with the same limit
//! - This is the outermost gate, so its 413 gets security headers here

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::observability::metrics;
use crate::security::headers::apply_security_headers;

const MIB: usize = 1024 * 1024;

/// Declared Content-Length, when present and numeric.
pub fn declared_length<B>(request: &Request<B>) -> Option<usize> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
}

pub fn too_large_message(limit: usize) -> String {
    format!("Request body too large. Max: {} MB.", limit / MIB)
}

/// Middleware rejecting oversized declared bodies with 413.
pub async fn body_size_middleware(
    State(limit): State<usize>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match declared_length(&request) {
        Some(length) if length > limit => {
            tracing::warn!(
                content_length = length,
                limit,
                path = %request.uri().path(),
                "Request body exceeds limit"
            );
            metrics::record_body_rejected();
            let mut response = ApiError::PayloadTooLarge(too_large_message(limit)).into_response();
            apply_security_headers(response.headers_mut());
            response
        }
        _ => next.run(request).await,
    }
}
