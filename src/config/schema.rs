//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files; the
//! loader layers environment overrides on top.

use serde::{Deserialize, Serialize};

/// Root configuration for the OCR gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Storage roots for raw uploads, preprocessed pages and output.
    pub storage: StorageConfig,

    /// Upload validation policy.
    pub upload: UploadConfig,

    /// Rasterisation limits (page count, pixel dimensions).
    pub render: RenderConfig,

    /// Page preprocessing.
    pub preprocess: PreprocessConfig,

    /// Inference backend settings.
    pub ocr: OcrConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Trusted proxies and body limits.
    pub security: SecurityConfig,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Optional API key gate.
    pub auth: AuthConfig,

    /// Background file retention.
    pub retention: RetentionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Storage roots. Every engine gets its own subdirectory under each root.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub raw_path: String,
    pub preprocessed_path: String,
    pub output_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_path: "./storage/raw".to_string(),
            preprocessed_path: "./storage/preprocessed".to_string(),
            output_path: "./storage/output".to_string(),
        }
    }
}

/// Upload validation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Lowercase file extensions accepted after sanitisation.
    pub allowed_extensions: Vec<String>,

    /// MIME types accepted after magic-byte sniffing.
    pub allowed_mime_types: Vec<String>,

    /// Maximum decoded upload size in megabytes.
    pub max_file_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![
                "pdf".to_string(),
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
            ],
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
            max_file_size_mb: 20,
        }
    }
}

impl UploadConfig {
    pub fn max_file_size_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

/// Rasterisation limits. These are the decompression-bomb guards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum number of pages accepted in a PDF.
    pub max_pdf_pages: usize,

    /// Maximum width or height of any page image in pixels.
    pub max_image_dimension: u32,

    /// PDF rendering resolution.
    pub dpi: u32,

    /// Explicit path to a pdfium shared library. Falls back to the system library.
    pub pdfium_library_path: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_pdf_pages: 50,
            max_image_dimension: 10_000,
            dpi: 150,
            pdfium_library_path: None,
        }
    }
}

/// Page preprocessing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Clockwise rotation applied to every page (0, 90, 180 or 270).
    pub rotate_degrees: u16,

    /// Detect each page's orientation with tesseract OSD and turn it upright.
    pub detect_orientation: bool,

    /// Path or name of the `tesseract` binary.
    pub tesseract_path: String,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            rotate_degrees: 0,
            detect_orientation: true,
            tesseract_path: "tesseract".to_string(),
        }
    }
}

/// Inference backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Base URL of the OpenAI-compatible inference server. Required.
    pub base_url: String,

    /// Model name sent with every request. Required.
    pub model_name: String,

    /// Engine used when the client does not pick one.
    pub default_engine: String,

    /// Per-call timeout for the inference client in seconds.
    pub request_timeout_secs: u64,

    /// Connect timeout for the inference client in seconds.
    pub connect_timeout_secs: u64,

    /// Upper bound on generated tokens per page.
    pub max_tokens: u32,

    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model_name: String::new(),
            default_engine: "lighton".to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
            max_tokens: 4000,
            temperature: 0.0,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total processing deadline for an OCR request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 300 }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per client within the trailing minute. 0 disables.
    pub requests_per_minute: u32,

    /// Paths that bypass the limiter (liveness probes).
    pub exempt_paths: Vec<String>,

    /// How often idle client windows are evicted, in seconds.
    pub eviction_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            exempt_paths: vec!["/health".to_string()],
            eviction_interval_secs: 60,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// CIDR ranges (or bare addresses) allowed to set X-Forwarded-For.
    pub trusted_proxies: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_request_body_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: vec![
                "127.0.0.1".to_string(),
                "172.16.0.0/12".to_string(),
                "10.0.0.0/8".to_string(),
            ],
            max_request_body_bytes: 25 * 1024 * 1024, // 25MB
        }
    }
}

/// CORS configuration. An empty list disables the CORS layer entirely.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// API key configuration. An empty key disables authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key: String,
    pub header_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            header_name: "X-API-Key".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// File retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Files older than this many hours are deleted. 0 disables the sweeper.
    pub hours: u64,

    /// Sweep interval in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hours: 72,
            sweep_interval_secs: 3600,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "json" for one JSON object per line, "pretty" for development.
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
