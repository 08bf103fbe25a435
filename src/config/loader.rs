//! Configuration loading from disk and environment.
//!
//! Sources are layered: schema defaults, then an optional TOML file, then
//! environment variables. The result is validated before it is returned.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable {var}={value:?} is invalid: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides on top of an existing configuration.
///
/// Variable names match the deployment environment of the service
/// (`VLLM_BASE_URL`, `MAX_FILE_SIZE_MB`, ...). Lists are comma separated.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    env.string("VLLM_BASE_URL", &mut config.ocr.base_url);
    env.string("VLLM_MODEL_NAME", &mut config.ocr.model_name);
    env.string("OCR_DEFAULT_ENGINE", &mut config.ocr.default_engine);
    env.parse("VLLM_TIMEOUT_SECONDS", &mut config.ocr.request_timeout_secs)?;

    env.string("RAW_STORAGE_PATH", &mut config.storage.raw_path);
    env.string("PREPROCESSED_STORAGE_PATH", &mut config.storage.preprocessed_path);
    env.string("OUTPUT_STORAGE_PATH", &mut config.storage.output_path);

    env.list("ALLOWED_EXTENSIONS", &mut config.upload.allowed_extensions);
    env.list("ALLOWED_MIME_TYPES", &mut config.upload.allowed_mime_types);
    env.parse("MAX_FILE_SIZE_MB", &mut config.upload.max_file_size_mb)?;

    env.parse("MAX_PDF_PAGES", &mut config.render.max_pdf_pages)?;
    env.parse("MAX_IMAGE_DIMENSION", &mut config.render.max_image_dimension)?;
    env.parse("PDF_RENDER_DPI", &mut config.render.dpi)?;
    env.parse("DETECT_ORIENTATION", &mut config.preprocess.detect_orientation)?;
    env.string("TESSERACT_PATH", &mut config.preprocess.tesseract_path);
    if let Some(path) = (env.lookup)("PDFIUM_LIB_PATH") {
        config.render.pdfium_library_path = Some(path);
    }

    env.parse("REQUEST_TIMEOUT_SECONDS", &mut config.timeouts.request_secs)?;
    env.list("TRUSTED_PROXIES", &mut config.security.trusted_proxies);
    env.parse("MAX_REQUEST_BODY_BYTES", &mut config.security.max_request_body_bytes)?;
    env.parse("RATE_LIMIT_PER_MINUTE", &mut config.rate_limit.requests_per_minute)?;
    env.list("CORS_ALLOWED_ORIGINS", &mut config.cors.allowed_origins);
    env.string("API_KEY", &mut config.auth.api_key);
    env.string("API_KEY_HEADER", &mut config.auth.header_name);
    env.parse("FILE_RETENTION_HOURS", &mut config.retention.hours)?;

    env.string("LOG_LEVEL", &mut config.observability.log_level);
    env.string("LOG_FORMAT", &mut config.observability.log_format);

    let host = (env.lookup)("HOST");
    let port = (env.lookup)("PORT");
    if host.is_some() || port.is_some() {
        let (default_host, default_port) = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .unwrap_or_else(|| ("0.0.0.0".to_string(), "8000".to_string()));
        config.listener.bind_address = format!(
            "{}:{}",
            host.unwrap_or(default_host),
            port.unwrap_or(default_port)
        );
    }

    Ok(())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &'static str, target: &mut String) {
        if let Some(value) = (self.lookup)(var) {
            *target = value;
        }
    }

    fn list(&self, var: &'static str, target: &mut Vec<String>) {
        if let Some(value) = (self.lookup)(var) {
            *target = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    fn parse<T>(&self, var: &'static str, target: &mut T) -> Result<(), ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = (self.lookup)(var) {
            *target = value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
                var,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_only_config() {
        let config = load_config_with(
            None,
            env(&[
                ("VLLM_BASE_URL", "http://localhost:8001"),
                ("VLLM_MODEL_NAME", "ocr-model"),
                ("TRUSTED_PROXIES", "10.0.0.0/8, 192.168.0.1"),
                ("RATE_LIMIT_PER_MINUTE", "5"),
                ("PORT", "9000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.ocr.base_url, "http://localhost:8001");
        assert_eq!(config.security.trusted_proxies, vec!["10.0.0.0/8", "192.168.0.1"]);
        assert_eq!(config.rate_limit.requests_per_minute, 5);
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn test_orientation_detection_overrides() {
        let config = load_config_with(
            None,
            env(&[
                ("VLLM_BASE_URL", "http://localhost:8001"),
                ("VLLM_MODEL_NAME", "ocr-model"),
                ("DETECT_ORIENTATION", "false"),
                ("TESSERACT_PATH", "/opt/tesseract/bin/tesseract"),
            ]),
        )
        .unwrap();

        assert!(!config.preprocess.detect_orientation);
        assert_eq!(config.preprocess.tesseract_path, "/opt/tesseract/bin/tesseract");
    }

    #[test]
    fn test_missing_required_fails_fast() {
        let err = load_config_with(None, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 2));
    }

    #[test]
    fn test_unparsable_number() {
        let err = load_config_with(
            None,
            env(&[
                ("VLLM_BASE_URL", "http://localhost:8001"),
                ("VLLM_MODEL_NAME", "m"),
                ("MAX_PDF_PAGES", "lots"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "MAX_PDF_PAGES", .. }));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[ocr]\nbase_url = \"http://file:8001\"\nmodel_name = \"from-file\"\n\n[upload]\nmax_file_size_mb = 5\n"
        )
        .unwrap();

        let config = load_config_with(
            Some(file.path()),
            env(&[("VLLM_MODEL_NAME", "from-env")]),
        )
        .unwrap();

        assert_eq!(config.ocr.base_url, "http://file:8001");
        assert_eq!(config.ocr.model_name, "from-env");
        assert_eq!(config.upload.max_file_size_mb, 5);
        assert_eq!(config.render.max_pdf_pages, 50);
    }
}
