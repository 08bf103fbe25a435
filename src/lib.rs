//! OCR gateway library.
//!
//! Accepts PDF and image uploads over HTTP, rasterizes them, sends each page
//! to a vision-language inference backend and returns a markdown transcript.

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod security;
pub mod storage;
pub mod upload;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
