//! Optional API key gate for the OCR route.
//!
//! Disabled when no key is configured. Comparison is constant-time.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::http::request::RequestIdExt;

#[derive(Clone)]
pub struct ApiKeyGate {
    key: Option<Arc<str>>,
    header: HeaderName,
}

impl ApiKeyGate {
    /// Validation guarantees the header name parses when a key is set.
    pub fn from_config(config: &AuthConfig) -> Self {
        let header = HeaderName::from_bytes(config.header_name.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-api-key"));
        let key = config
            .is_enabled()
            .then(|| Arc::from(config.api_key.as_str()));
        Self { key, header }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Header the key is read from. Browsers must be allowed to send it.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn accepts<B>(&self, request: &Request<B>) -> bool {
        let Some(expected) = &self.key else {
            return true;
        };
        request
            .headers()
            .get(&self.header)
            .map(|provided| bool::from(provided.as_bytes().ct_eq(expected.as_bytes())))
            .unwrap_or(false)
    }
}

pub async fn api_key_middleware(
    State(gate): State<ApiKeyGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.accepts(&request) {
        return next.run(request).await;
    }

    let request_id = request.request_id().cloned();
    tracing::warn!(
        request_id = request_id.as_ref().map(|id| id.as_str()).unwrap_or("unknown"),
        "Rejected request with invalid or missing API key"
    );
    ApiError::Forbidden.into_response()
}
