//! Timeout enforcement.
//!
//! # Responsibilities
//! - Put a deadline on OCR request processing
//! - Cancel the in-flight handler future on expiry
//! - Answer 504 with the request id logged
//! - Count the 504 in the request metrics; the cancelled handler cannot
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Work already moved to `spawn_blocking` cannot be cancelled and may
//!   finish after the 504 has been sent
//! - Timed-out requests return 504 Gateway Timeout

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::http::request::RequestIdExt;
use crate::observability::metrics;

/// Middleware wrapping the inner service in `tokio::time::timeout`.
pub async fn timeout_middleware(
    State(deadline): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = request.request_id().cloned();
    let start = Instant::now();

    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(
                request_id = request_id.as_ref().map(|id| id.as_str()).unwrap_or("unknown"),
                timeout_secs = deadline.as_secs(),
                "Request timed out"
            );
            metrics::record_timeout();
            let response = ApiError::Timeout.into_response_for(request_id.as_ref());
            metrics::record_request(response.status().as_u16(), start);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn create_test_app(deadline: Duration) -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }))
            .layer(middleware::from_fn_with_state(deadline, timeout_middleware))
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let response = create_test_app(Duration::from_millis(50))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Request timed out.");
    }

    #[tokio::test]
    async fn test_fast_request_passes() {
        let request = Request::builder().uri("/fast").body(Body::empty()).unwrap();
        let response = create_test_app(Duration::from_secs(5))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
