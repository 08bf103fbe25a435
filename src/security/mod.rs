//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (outermost first):
//!     → limits.rs (declared Content-Length vs limit)
//!     → rate_limit.rs (sliding window per client address)
//!     → headers.rs (hardening headers on the way out)
//!     → http::request (correlation id)
//!     → proxy.rs (trusted proxy resolution, ClientIp extension)
//!     → auth.rs (API key, /ocr only)
//!     → Pass to handlers
//! ```
//!
//! # Design Decisions
//! - Each gate is an independent `from_fn` middleware
//! - Fail closed: reject on any security check failure
//! - No trust in client input, including forwarded headers

pub mod auth;
pub mod headers;
pub mod limits;
pub mod proxy;
pub mod rate_limit;
