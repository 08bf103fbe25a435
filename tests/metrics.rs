//! Request metrics as seen through the Prometheus recorder.
//!
//! Kept in its own binary: the recorder is process-global.

mod common;

use common::*;
use metrics_exporter_prometheus::PrometheusBuilder;
use reqwest::StatusCode;
use tempfile::TempDir;

#[tokio::test]
async fn test_timed_out_request_is_counted() {
    let handle = PrometheusBuilder::new().install_recorder().unwrap();

    let backend = start_silent_backend().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &format!("http://{backend}"));
    config.timeouts.request_secs = 1;
    let gateway = start_gateway(config, 1).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/ocr"))
        .multipart(upload_form("scan.png", png_fixture(8, 8), None))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let rendered = handle.render();
    assert!(rendered.contains(r#"ocr_requests_total{status="504"} 1"#), "{rendered}");
    assert!(rendered.contains("ocr_timeouts_total 1"), "{rendered}");
    assert!(rendered.contains("ocr_request_duration_seconds_count 1"), "{rendered}");
}
