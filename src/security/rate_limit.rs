//! Sliding-window rate limiting keyed by client address.
//!
//! Every admitted request leaves a timestamp in its key's window. A request
//! is admitted only while fewer than `capacity` timestamps remain inside the
//! last `window`, so no span of `window` ever admits more than `capacity`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::observability::metrics;
use crate::security::headers::apply_security_headers;
use crate::security::proxy::{client_ip, TrustedNetworks};

/// Fixed window length for the per-minute limit.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after_secs: u64 },
}

/// Per-key sliding window limiter.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    capacity: usize,
    window: Duration,
}

impl RateLimiter {
    /// `capacity = 0` disables the limiter.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            capacity: capacity as usize,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute, WINDOW)
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Check and record one request for `key` at `now`.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        if !self.is_enabled() {
            return Admission::Allowed;
        }

        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let stamps = windows.entry(key.to_string()).or_default();

        while let Some(oldest) = stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.capacity {
            return Admission::Denied {
                retry_after_secs: self.window.as_secs(),
            };
        }

        stamps.push_back(now);
        Admission::Allowed
    }

    /// Drop keys with no timestamp inside the window. Returns how many went.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, stamps| {
            stamps
                .back()
                .map(|newest| now.saturating_duration_since(*newest) < self.window)
                .unwrap_or(false)
        });
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Periodically evict idle keys until shutdown is broadcast.
    pub async fn run_evictor(self: Arc<Self>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.evict_idle(Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.tracked_keys(), "Evicted idle rate-limit keys");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate-limit evictor stopping");
                    break;
                }
            }
        }
    }
}

/// State for the rate-limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub networks: Arc<TrustedNetworks>,
    pub exempt_paths: Arc<[String]>,
}

impl RateLimitState {
    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }
}

/// Middleware function for per-client rate limiting.
///
/// Sits outside the proxy resolver, so the client key is resolved here
/// from the same trusted network set.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.limiter.is_enabled() || state.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let client = client_ip(&state.networks, &request).to_string();

    match state.limiter.admit(&client) {
        Admission::Allowed => next.run(request).await,
        Admission::Denied { retry_after_secs } => {
            tracing::warn!(client_ip = %client, path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            let mut response = ApiError::RateLimited { retry_after_secs }.into_response();
            apply_security_headers(response.headers_mut());
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_enforced_within_window() {
        let limiter = RateLimiter::new(3, WINDOW);
        let start = Instant::now();

        for i in 0..3 {
            let now = start + Duration::from_secs(i);
            assert_eq!(limiter.admit_at("10.0.0.1", now), Admission::Allowed);
        }
        assert_eq!(
            limiter.admit_at("10.0.0.1", start + Duration::from_secs(10)),
            Admission::Denied { retry_after_secs: 60 }
        );
        // Other keys are independent.
        assert_eq!(limiter.admit_at("10.0.0.2", start), Admission::Allowed);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, WINDOW);
        let start = Instant::now();

        assert_eq!(limiter.admit_at("k", start), Admission::Allowed);
        assert_eq!(limiter.admit_at("k", start + Duration::from_secs(30)), Admission::Allowed);
        assert!(matches!(
            limiter.admit_at("k", start + Duration::from_secs(59)),
            Admission::Denied { .. }
        ));

        // The first stamp ages out at exactly one window.
        assert_eq!(limiter.admit_at("k", start + Duration::from_secs(60)), Admission::Allowed);
        assert!(matches!(
            limiter.admit_at("k", start + Duration::from_secs(61)),
            Admission::Denied { .. }
        ));
    }

    #[test]
    fn test_denied_requests_do_not_extend_window() {
        let limiter = RateLimiter::new(1, WINDOW);
        let start = Instant::now();

        assert_eq!(limiter.admit_at("k", start), Admission::Allowed);
        for s in 1..60 {
            assert!(matches!(
                limiter.admit_at("k", start + Duration::from_secs(s)),
                Admission::Denied { .. }
            ));
        }
        assert_eq!(limiter.admit_at("k", start + Duration::from_secs(60)), Admission::Allowed);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let limiter = RateLimiter::new(0, WINDOW);
        for _ in 0..100 {
            assert_eq!(limiter.admit("k"), Admission::Allowed);
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_evict_idle_keys() {
        let limiter = RateLimiter::new(5, WINDOW);
        let start = Instant::now();

        limiter.admit_at("old", start);
        limiter.admit_at("fresh", start + Duration::from_secs(50));
        assert_eq!(limiter.tracked_keys(), 2);

        let evicted = limiter.evict_idle(start + Duration::from_secs(70));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_respect_cap() {
        let limiter = Arc::new(RateLimiter::new(20, WINDOW));
        let mut handles = Vec::new();

        for _ in 0..200 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.admit("203.0.113.9") }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() == Admission::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
    }

    #[tokio::test]
    async fn test_middleware_denies_with_retry_after() {
        use axum::{http::StatusCode, middleware, routing::get, Router};
        use tower::ServiceExt;

        let state = RateLimitState {
            limiter: Arc::new(RateLimiter::new(1, WINDOW)),
            networks: Arc::new(TrustedNetworks::default()),
            exempt_paths: Arc::from(vec!["/health".to_string()]),
        };
        let app = Router::new()
            .route("/ocr", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware));

        let req = || Request::builder().uri("/ocr").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(req()).await.unwrap().status(), StatusCode::OK);

        let denied = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers()["retry-after"], "60");
        assert_eq!(denied.headers()["x-content-type-options"], "nosniff");

        for _ in 0..5 {
            let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
            assert_eq!(app.clone().oneshot(health).await.unwrap().status(), StatusCode::OK);
        }
    }
}
