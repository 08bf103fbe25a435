//! Request-level error taxonomy.
//!
//! [`ApiError`] is the only error type that reaches the HTTP surface. Every
//! lower layer has its own `thiserror` enum and converts into it with `From`,
//! except [`crate::engine::EngineError`]: inference failures are recovered
//! per page and never abort a request.
//!
//! | Variant            | Status | Detail returned to caller        |
//! |--------------------|--------|----------------------------------|
//! | `BadRequest`       | 400    | full reason                      |
//! | `PayloadTooLarge`  | 413    | full reason                      |
//! | `Forbidden`        | 403    | fixed                            |
//! | `RateLimited`      | 429    | fixed, plus `Retry-After`        |
//! | `Timeout`          | 504    | fixed                            |
//! | `Storage`/`Internal` | 500  | generic, plus `request_id`       |

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::UnknownEngine;
use crate::pipeline::rasterize::RasterError;
use crate::upload::validator::UploadRejection;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Invalid or missing API key.")]
    Forbidden,

    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out.")]
    Timeout,

    #[error("Not found.")]
    NotFound,

    #[error("Method not allowed.")]
    MethodNotAllowed,

    #[error("storage failure while {context} ({path:?}): {source}")]
    Storage {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn storage(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ApiError::Storage {
            context,
            path: path.into(),
            source,
        }
    }

    /// Server-side faults whose cause must stay in the logs.
    pub fn is_internal(&self) -> bool {
        matches!(self, ApiError::Storage { .. } | ApiError::Internal(_))
    }
}

impl From<UploadRejection> for ApiError {
    fn from(rejection: UploadRejection) -> Self {
        match rejection {
            UploadRejection::TooLarge { .. } => ApiError::PayloadTooLarge(rejection.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<UnknownEngine> for ApiError {
    fn from(err: UnknownEngine) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<RasterError> for ApiError {
    fn from(err: RasterError) -> Self {
        if err.is_client_fault() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}
