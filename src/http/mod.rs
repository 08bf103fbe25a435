//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, gate stack)
//!     → request.rs (request ID, tracing span)
//!     → handlers.rs (multipart extraction, pipeline call)
//!     → response.rs (error mapping, markdown attachment)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, GatewayComponents, HttpServer};
