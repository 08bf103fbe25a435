//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! POST /ocr:
//!     → timeouts.rs (deadline over the whole orchestrator run)
//!     → engine client (own connect/request timeouts per page)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Inference failures degrade a single page, never the request

pub mod timeouts;
