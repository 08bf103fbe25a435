//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the OCR and health handlers
//! - Wire up the gate stack in a fixed order
//! - Start background tasks (rate-limit eviction, file retention)
//! - Serve until the shutdown broadcast fires
//!
//! # Layer order (outermost first)
//! ```text
//! BodySize → RateLimit → SecurityHeaders → Correlation → TrustedProxy
//!     → Cors → Trace → RequestBodyLimit → CatchPanic
//!     → Router { /health, /ocr [ApiKey → Timeout] }
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::{CorsConfig, GatewayConfig};
use crate::engine::EngineRegistry;
use crate::http::handlers;
use crate::http::request::{correlation_middleware, X_REQUEST_ID};
use crate::http::response::HandlerPanic;
use crate::lifecycle::shutdown::{self, Shutdown};
use crate::pipeline::{DefaultPreprocessor, DocumentRasterizer, Orchestrator, Preprocessor, Rasterizer};
use crate::resilience::timeouts::timeout_middleware;
use crate::security::auth::{api_key_middleware, ApiKeyGate};
use crate::security::headers::security_headers_middleware;
use crate::security::limits::body_size_middleware;
use crate::security::proxy::{trusted_proxy_middleware, TrustedNetworks};
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState, RateLimiter};
use crate::storage::RetentionSweeper;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub body_limit: usize,
}

/// Pluggable parts of the pipeline.
pub struct GatewayComponents {
    pub engines: Arc<EngineRegistry>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub preprocessor: Arc<dyn Preprocessor>,
}

impl GatewayComponents {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            engines: Arc::new(EngineRegistry::from_config(&config.ocr)?),
            rasterizer: Arc::new(DocumentRasterizer::from_config(&config.render)),
            preprocessor: Arc::new(DefaultPreprocessor::from_config(&config.preprocess)),
        })
    }
}

/// HTTP server for the OCR gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a server with the built-in engines and rasterizer.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let components = GatewayComponents::from_config(&config)?;
        Ok(Self::with_components(config, components))
    }

    pub fn with_components(config: GatewayConfig, components: GatewayComponents) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            components.engines,
            components.rasterizer,
            components.preprocessor,
        ));
        let state = AppState {
            orchestrator,
            body_limit: config.security.max_request_body_bytes,
        };
        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

        let router = Self::build_router(&config, state, rate_limiter.clone());
        Self {
            router,
            config,
            rate_limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState, rate_limiter: Arc<RateLimiter>) -> Router {
        let body_limit = config.security.max_request_body_bytes;
        let networks = Arc::new(TrustedNetworks::parse(&config.security.trusted_proxies));
        let api_key = ApiKeyGate::from_config(&config.auth);
        let api_key_header = api_key.header().clone();
        let deadline = Duration::from_secs(config.timeouts.request_secs);

        let rate_limit = RateLimitState {
            limiter: rate_limiter,
            networks: networks.clone(),
            exempt_paths: config.rate_limit.exempt_paths.clone().into(),
        };

        let ocr_route = post(handlers::ocr)
            .route_layer(middleware::from_fn_with_state(deadline, timeout_middleware))
            .route_layer(middleware::from_fn_with_state(api_key, api_key_middleware));

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route("/ocr", ocr_route)
            .fallback(handlers::not_found)
            .method_not_allowed_fallback(handlers::method_not_allowed)
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(TraceLayer::new_for_http());

        if let Some(cors) = cors_layer(&config.cors, api_key_header) {
            router = router.layer(cors);
        }

        router
            .layer(middleware::from_fn_with_state(networks, trusted_proxy_middleware))
            .layer(middleware::from_fn(correlation_middleware))
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(body_limit, body_size_middleware))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.rate_limiter.is_enabled() {
            let every = Duration::from_secs(self.config.rate_limit.eviction_interval_secs.max(1));
            tokio::spawn(self.rate_limiter.clone().run_evictor(every, shutdown.subscribe()));
        }

        let sweeper = RetentionSweeper::from_config(&self.config.storage, &self.config.retention);
        tokio::spawn(sweeper.run(shutdown.subscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown.subscribe()))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// CORS is only installed when at least one origin is configured.
/// `api_key_header` is allowed alongside the fixed request headers.
pub fn cors_layer(config: &CorsConfig, api_key_header: HeaderName) -> Option<CorsLayer> {
    if config.allowed_origins.is_empty() {
        return None;
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            X_REQUEST_ID.clone(),
            api_key_header,
        ])
        .expose_headers([X_REQUEST_ID.clone(), header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(3600));

    if config.allowed_origins.iter().any(|o| o == "*") {
        return Some(cors.allow_origin(AnyOrigin));
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(cors.allow_origin(AllowOrigin::list(origins)))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    HandlerPanic(format!("handler panicked: {detail}")).into_response()
}
