//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Bind the listener and begin accepting traffic
//! - Wire OS signals to the shutdown broadcast
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::metrics;
use crate::pipeline::DocumentRasterizer;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build inference client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the gateway until a shutdown signal arrives.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        engine = %config.ocr.default_engine,
        backend = %config.ocr.base_url,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_per_minute = config.rate_limit.requests_per_minute,
        api_key_enabled = config.auth.is_enabled(),
        "Configuration loaded"
    );

    match DocumentRasterizer::from_config(&config.render).probe() {
        Ok(()) => tracing::info!("PDF renderer available"),
        Err(e) => tracing::warn!(error = %e, "PDF renderer unavailable, PDF uploads will fail"),
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;

    let address = server.config().listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    server.run(listener, shutdown).await.map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
