//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ocr_requests_total` (counter): OCR requests by status
//! - `ocr_request_duration_seconds` (histogram): end-to-end OCR latency
//! - `ocr_pages_total` (counter): pages by outcome (`ok`, `failed`)
//! - `ocr_upload_rejected_total` (counter): rejected uploads by reason
//! - `ocr_rate_limited_total` (counter): requests denied by the rate limiter
//! - `ocr_body_rejected_total` (counter): bodies refused on declared length
//! - `ocr_timeouts_total` (counter): requests cut off by the deadline
//! - `ocr_retention_removed_total` (counter): files deleted by retention
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - The Prometheus exporter is optional and runs its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(status: u16, start: Instant) {
    counter!("ocr_requests_total", "status" => status.to_string()).increment(1);
    histogram!("ocr_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_page(ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    counter!("ocr_pages_total", "outcome" => outcome).increment(1);
}

pub fn record_upload_rejected(reason: &'static str) {
    counter!("ocr_upload_rejected_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited() {
    counter!("ocr_rate_limited_total").increment(1);
}

pub fn record_body_rejected() {
    counter!("ocr_body_rejected_total").increment(1);
}

pub fn record_timeout() {
    counter!("ocr_timeouts_total").increment(1);
}

pub fn record_retention_sweep(removed: usize, failed: usize) {
    counter!("ocr_retention_removed_total").increment(removed as u64);
    counter!("ocr_retention_failed_total").increment(failed as u64);
}
