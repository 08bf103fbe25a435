//! Request correlation.
//!
//! # Responsibilities
//! - Reuse an inbound `X-Request-ID` or generate a fresh one
//! - Store it in request extensions for handlers and inner gates
//! - Run the rest of the stack inside a span carrying the id
//! - Echo it on every response, success or failure
//! - Attach the id to the 500 body of a caught handler panic
//!
//! # Design Decisions
//! - Generated ids are 128-bit random (UUID v4) rendered as 32 hex chars
//! - An empty or non-ASCII inbound header is treated as absent

use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::response::HandlerPanic;

/// The header name for request correlation IDs.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// A unique identifier for a request, used for log correlation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Generates a new random id (32 lowercase hex chars).
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().simple().to_string()))
    }

    /// Takes the inbound header value if it is usable, otherwise generates one.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Self::new)
            .unwrap_or_else(Self::generate)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extension trait to read the correlation id off a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Middleware that tags each request and echoes the id on the response.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = RequestId::from_header(request.headers().get(&X_REQUEST_ID));

    // Generated ids are hex, inbound ones passed to_str(), so this cannot fail
    // in practice. Keep going without the header rather than rejecting.
    let header_value = HeaderValue::from_str(request_id.as_str()).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(X_REQUEST_ID.clone(), value.clone());
    }
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Some(HandlerPanic(detail)) = response.extensions_mut().remove::<HandlerPanic>() {
        response = ApiError::Internal(detail).into_response_for(Some(&request_id));
    }

    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn echo_handler(Extension(id): Extension<RequestId>) -> String {
        id.to_string()
    }

    async fn failing_handler() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn create_test_app() -> Router {
        Router::new()
            .route("/test", get(echo_handler))
            .route("/fail", get(failing_handler))
            .layer(middleware::from_fn(correlation_middleware))
    }

    #[tokio::test]
    async fn test_generates_id_when_missing() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = create_test_app().oneshot(request).await.unwrap();

        let header = response.headers().get(&X_REQUEST_ID).expect("should have request id");
        let id = header.to_str().unwrap().to_string();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, id.as_bytes());
    }

    #[tokio::test]
    async fn test_preserves_existing_id() {
        let request = Request::builder()
            .uri("/test")
            .header(X_REQUEST_ID.clone(), "my-custom-id-123")
            .body(Body::empty())
            .unwrap();
        let response = create_test_app().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[&X_REQUEST_ID], "my-custom-id-123");
    }

    #[tokio::test]
    async fn test_empty_header_is_replaced() {
        let request = Request::builder()
            .uri("/test")
            .header(X_REQUEST_ID.clone(), "")
            .body(Body::empty())
            .unwrap();
        let response = create_test_app().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[&X_REQUEST_ID].len(), 32);
    }

    #[tokio::test]
    async fn test_echoed_on_error_responses() {
        let request = Request::builder()
            .uri("/fail")
            .header(X_REQUEST_ID.clone(), "trace-me")
            .body(Body::empty())
            .unwrap();
        let response = create_test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[&X_REQUEST_ID], "trace-me");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }
}
