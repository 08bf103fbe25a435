//! Security response headers.
//!
//! # Responsibilities
//! - Set the fixed browser-hardening headers on every response
//! - Remove `Server` so the stack is not advertised
//!
//! # Design Decisions
//! - Values override anything a handler set
//! - Gates that answer before this layer runs call [`apply_security_headers`]
//!   on their own responses

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

static SECURITY_HEADERS: [(HeaderName, HeaderValue); 7] = [
    (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
    (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
    (
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    ),
    (
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"),
    ),
    (
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    ),
    (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
    (
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    ),
];

pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS.iter() {
        headers.insert(name.clone(), value.clone());
    }
    headers.remove(header::SERVER);
}

pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn leaky_handler() -> Response {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::SERVER, "uvicorn")
            .header(header::X_FRAME_OPTIONS, "SAMEORIGIN")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_headers_on_every_response() {
        let app = Router::new()
            .route("/", get(leaky_handler))
            .layer(middleware::from_fn(security_headers_middleware));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(
            headers["content-security-policy"],
            "default-src 'none'; frame-ancestors 'none'"
        );
        assert_eq!(
            headers["strict-transport-security"],
            "max-age=63072000; includeSubDomains; preload"
        );
        assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert_eq!(
            headers["permissions-policy"],
            "camera=(), microphone=(), geolocation=()"
        );
        assert!(headers.get(header::SERVER).is_none());
    }
}
