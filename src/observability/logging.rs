//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Pick JSON (production) or pretty (development) output
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Library noise from `tower_http` is kept at warn by default

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

pub fn default_filter(config: &ObservabilityConfig) -> String {
    format!("ocr_gateway={},tower_http=warn", config.log_level)
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.log_format.eq_ignore_ascii_case("pretty") {
        registry.with(fmt::layer().pretty()).try_init()
    } else {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
