//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required inference settings are present
//! - Validate value ranges (limits > 0, timeouts > 0)
//! - Check the retention horizon outlives the request deadline
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Malformed trusted-proxy entries are not errors; they are skipped with a
//!   warning when the network set is built

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::engine;
use crate::upload::validator::KNOWN_MIME_TYPES;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} is not a valid http(s) URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Validate a fully loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Inference backend
    if config.ocr.base_url.trim().is_empty() {
        errors.push(ValidationError::Missing("ocr.base_url (VLLM_BASE_URL)"));
    } else {
        match url::Url::parse(&config.ocr.base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(ValidationError::InvalidUrl {
                field: "ocr.base_url",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidUrl {
                field: "ocr.base_url",
                reason: e.to_string(),
            }),
        }
    }
    if config.ocr.model_name.trim().is_empty() {
        errors.push(ValidationError::Missing("ocr.model_name (VLLM_MODEL_NAME)"));
    }
    if !engine::builtin_engine_names()
        .iter()
        .any(|name| name.eq_ignore_ascii_case(&config.ocr.default_engine))
    {
        errors.push(invalid(
            "ocr.default_engine",
            format!(
                "unknown engine '{}' (available: {})",
                config.ocr.default_engine,
                engine::builtin_engine_names().join(", ")
            ),
        ));
    }
    if config.ocr.request_timeout_secs == 0 {
        errors.push(invalid("ocr.request_timeout_secs", "must be greater than 0"));
    }
    if config.ocr.max_tokens == 0 {
        errors.push(invalid("ocr.max_tokens", "must be greater than 0"));
    }

    // Listener
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    // Upload policy
    if config.upload.allowed_extensions.is_empty() {
        errors.push(invalid("upload.allowed_extensions", "must not be empty"));
    }
    for mime in &config.upload.allowed_mime_types {
        if !KNOWN_MIME_TYPES.contains(&mime.as_str()) {
            errors.push(invalid(
                "upload.allowed_mime_types",
                format!("no content signature known for '{mime}'"),
            ));
        }
    }
    if config.upload.max_file_size_mb == 0 {
        errors.push(invalid("upload.max_file_size_mb", "must be greater than 0"));
    }

    // Bomb guards
    if config.render.max_pdf_pages == 0 {
        errors.push(invalid("render.max_pdf_pages", "must be greater than 0"));
    }
    if config.render.max_image_dimension == 0 {
        errors.push(invalid("render.max_image_dimension", "must be greater than 0"));
    }
    if !(36..=600).contains(&config.render.dpi) {
        errors.push(invalid("render.dpi", "must be between 36 and 600"));
    }
    if !matches!(config.preprocess.rotate_degrees, 0 | 90 | 180 | 270) {
        errors.push(invalid("preprocess.rotate_degrees", "must be 0, 90, 180 or 270"));
    }
    if config.preprocess.detect_orientation && config.preprocess.tesseract_path.trim().is_empty() {
        errors.push(invalid("preprocess.tesseract_path", "must not be empty when orientation detection is on"));
    }

    // Gates
    if config.timeouts.request_secs == 0 {
        errors.push(invalid("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_request_body_bytes == 0 {
        errors.push(invalid("security.max_request_body_bytes", "must be greater than 0"));
    }
    if config.rate_limit.eviction_interval_secs == 0 {
        errors.push(invalid("rate_limit.eviction_interval_secs", "must be greater than 0"));
    }
    if config.auth.is_enabled() && HeaderName::try_from(config.auth.header_name.as_str()).is_err() {
        errors.push(invalid(
            "auth.header_name",
            format!("'{}' is not a valid header name", config.auth.header_name),
        ));
    }

    // Retention must outlive the longest possible request, otherwise the
    // sweeper can delete files a request is still writing.
    if config.retention.hours > 0 {
        if config.retention.hours.saturating_mul(3600) <= config.timeouts.request_secs {
            errors.push(invalid(
                "retention.hours",
                "retention horizon must exceed timeouts.request_secs",
            ));
        }
        if config.retention.sweep_interval_secs == 0 {
            errors.push(invalid("retention.sweep_interval_secs", "must be greater than 0"));
        }
    }

    if !matches!(config.observability.log_format.as_str(), "json" | "pretty") {
        errors.push(invalid("observability.log_format", "must be 'json' or 'pretty'"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
