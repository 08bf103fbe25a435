//! OCR engines.
//!
//! # Responsibilities
//! - Define the [`OcrEngine`] seam the orchestrator calls once per page
//! - Build every built-in engine once at startup from a static table
//! - Resolve client-supplied engine names to registry keys
//!
//! # Design Decisions
//! - Lookup is case-insensitive; the canonical key is what reaches storage
//! - Engines share one pooled `reqwest::Client`
//! - [`EngineError`] never fails a request; it becomes an inline page marker

pub mod chat_completions;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::OcrConfig;
use crate::pipeline::page::EncodedPage;

pub use chat_completions::ChatCompletionsEngine;

pub type EngineFuture<'a> = Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>>;

pub trait OcrEngine: Send + Sync {
    /// Extract text from one page. The PNG was encoded off the async workers
    /// and is the same image stored on disk.
    fn infer<'a>(&'a self, page: &'a EncodedPage) -> EngineFuture<'a>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("inference backend returned {status}")]
    Status { status: u16, body: String },

    #[error("inference backend unreachable: {0}")]
    Connection(String),

    #[error("unexpected inference response: {0}")]
    MalformedResponse(String),

    #[error("failed to encode page: {0}")]
    Encode(String),
}

impl EngineError {
    /// Text placed in the document instead of the page's OCR output.
    pub fn marker(&self) -> String {
        match self {
            Self::Status { status, .. } => format!("[vLLM error: {status}]"),
            Self::Connection(msg) => format!("[vLLM connection error: {msg}]"),
            Self::MalformedResponse(msg) => format!("[vLLM response parse error: {msg}]"),
            Self::Encode(msg) => format!("[page encoding error: {msg}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown engine '{name}'. Available engines: {available}")]
pub struct UnknownEngine {
    pub name: String,
    pub available: String,
}

type EngineFactory = fn(&OcrConfig, reqwest::Client) -> Arc<dyn OcrEngine>;

const BUILTIN_ENGINES: &[(&str, EngineFactory)] = &[("lighton", ChatCompletionsEngine::shared)];

pub fn builtin_engine_names() -> Vec<&'static str> {
    BUILTIN_ENGINES.iter().map(|(name, _)| *name).collect()
}

/// Shared HTTP client for inference calls.
pub fn build_http_client(config: &OcrConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
}

/// Immutable name → engine table.
pub struct EngineRegistry {
    engines: BTreeMap<&'static str, Arc<dyn OcrEngine>>,
}

impl EngineRegistry {
    pub fn from_config(config: &OcrConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        let registry = Self::from_engines(
            BUILTIN_ENGINES
                .iter()
                .map(|(name, factory)| (*name, factory(config, client.clone()))),
        );
        tracing::info!(
            engines = %registry.names().join(", "),
            base_url = %config.base_url,
            model = %config.model_name,
            "OCR engines ready"
        );
        Ok(registry)
    }

    pub fn from_engines(engines: impl IntoIterator<Item = (&'static str, Arc<dyn OcrEngine>)>) -> Self {
        Self {
            engines: engines.into_iter().collect(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.engines.keys().copied().collect()
    }

    /// Look up `requested`, falling back to `default` when absent or blank.
    pub fn resolve(
        &self,
        requested: Option<&str>,
        default: &str,
    ) -> Result<(&'static str, Arc<dyn OcrEngine>), UnknownEngine> {
        let name = requested
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(default);

        self.engines
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, engine)| (*key, engine.clone()))
            .ok_or_else(|| UnknownEngine {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(&'static str);

    impl OcrEngine for FixedEngine {
        fn infer<'a>(&'a self, _page: &'a EncodedPage) -> EngineFuture<'a> {
            Box::pin(async move { Ok(self.0.to_string()) })
        }
    }

    fn registry() -> EngineRegistry {
        EngineRegistry::from_engines([
            ("lighton", Arc::new(FixedEngine("a")) as Arc<dyn OcrEngine>),
            ("other", Arc::new(FixedEngine("b")) as Arc<dyn OcrEngine>),
        ])
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let (name, _) = registry().resolve(Some("LightOn"), "other").unwrap();
        assert_eq!(name, "lighton");
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        assert_eq!(registry().resolve(None, "other").unwrap().0, "other");
        assert_eq!(registry().resolve(Some("  "), "lighton").unwrap().0, "lighton");
    }

    #[test]
    fn test_unknown_engine_lists_available() {
        let err = registry().resolve(Some("../etc"), "lighton").err().unwrap();
        assert_eq!(err.to_string(), "Unknown engine '../etc'. Available engines: lighton, other");
    }

    #[test]
    fn test_markers() {
        assert_eq!(
            EngineError::Status { status: 503, body: String::new() }.marker(),
            "[vLLM error: 503]"
        );
        assert_eq!(
            EngineError::Connection("refused".into()).marker(),
            "[vLLM connection error: refused]"
        );
        assert_eq!(
            EngineError::MalformedResponse("no choices".into()).marker(),
            "[vLLM response parse error: no choices]"
        );
    }

    #[test]
    fn test_builtin_table() {
        assert_eq!(builtin_engine_names(), vec!["lighton"]);
    }
}
