//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults except the inference backend
//! - Validation separates syntactic (serde) from semantic checks
//! - The process fails fast on any validation error

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, CorsConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, OcrConfig,
    PreprocessConfig, RateLimitConfig, RenderConfig, RetentionConfig, SecurityConfig,
    StorageConfig, TimeoutConfig, UploadConfig,
};
