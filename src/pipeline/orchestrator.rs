//! Per-request OCR pipeline.
//!
//! ```text
//! Received → Validated → Persisted(raw) → Rasterized
//!     → [Preprocessed(i) → Inferred(i)]* → Assembled → Persisted(output) → Complete
//! ```
//!
//! A request is rejected before anything is written when the engine name or
//! the upload is invalid. Rasterisation failures abort before any inference.
//! Inference failures only degrade the page they happened on.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;

use crate::config::{GatewayConfig, StorageConfig};
use crate::engine::EngineRegistry;
use crate::error::ApiError;
use crate::http::request::RequestId;
use crate::observability::metrics;
use crate::pipeline::markdown::{MarkdownReport, OcrDocument, PageOutcome};
use crate::pipeline::preprocess::Preprocessor;
use crate::pipeline::rasterize::{rasterize_blocking, RasterError, RasterLimits, Rasterizer};
use crate::security::proxy::ClientIp;
use crate::storage::{FileIdentity, StorageLayout};
use crate::upload::UploadValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Validated,
    Persisted,
    Rasterized,
    Assembled,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Persisted => "persisted",
            Stage::Rasterized => "rasterized",
            Stage::Assembled => "assembled",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Everything the handler extracted from the multipart body.
#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub request_id: RequestId,
    pub client_ip: ClientIp,
    pub filename: Option<String>,
    pub content: Bytes,
    pub engine: Option<String>,
}

/// The assembled document and the name it is offered for download under.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub markdown: String,
    pub download_name: String,
}

pub struct Orchestrator {
    engines: Arc<EngineRegistry>,
    rasterizer: Arc<dyn Rasterizer>,
    preprocessor: Arc<dyn Preprocessor>,
    validator: UploadValidator,
    limits: RasterLimits,
    storage: StorageConfig,
    default_engine: String,
}

impl Orchestrator {
    pub fn new(
        config: &GatewayConfig,
        engines: Arc<EngineRegistry>,
        rasterizer: Arc<dyn Rasterizer>,
        preprocessor: Arc<dyn Preprocessor>,
    ) -> Self {
        Self {
            engines,
            rasterizer,
            preprocessor,
            validator: UploadValidator::from_config(&config.upload),
            limits: RasterLimits::from_config(&config.render),
            storage: config.storage.clone(),
            default_engine: config.ocr.default_engine.clone(),
        }
    }

    pub async fn process(&self, request: OcrRequest) -> Result<OcrOutcome, ApiError> {
        let start = Instant::now();
        let rid = request.request_id.as_str();
        tracing::debug!(request_id = rid, stage = %Stage::Received, bytes = request.content.len());

        let (engine_name, engine) = self
            .engines
            .resolve(request.engine.as_deref(), &self.default_engine)?;

        let envelope = self
            .validator
            .validate(request.filename.as_deref(), request.content)
            .inspect_err(|rejection| {
                tracing::info!(request_id = rid, client_ip = %request.client_ip, reason = rejection.reason_label(), "Upload rejected");
            })?;
        tracing::debug!(request_id = rid, stage = %Stage::Validated, mime = envelope.mime_type);

        let identity = FileIdentity::generate(&envelope.original_name);
        let layout = StorageLayout::build(&identity, engine_name, &self.storage);
        layout
            .ensure_dirs()
            .await
            .map_err(|e| ApiError::storage("creating storage directories", &layout.preprocessed_dir, e))?;
        tokio::fs::write(&layout.raw_path, &envelope.content)
            .await
            .map_err(|e| ApiError::storage("writing upload", &layout.raw_path, e))?;

        tracing::info!(
            request_id = rid,
            client_ip = %request.client_ip,
            engine = engine_name,
            file_hash = %envelope.sha256,
            stage = %Stage::Persisted,
            "File accepted"
        );

        let pages = rasterize_blocking(
            self.rasterizer.clone(),
            envelope.content.clone(),
            envelope.extension.clone(),
            self.limits,
        )
        .await
        .map_err(|e| {
            log_raster_error(rid, &e);
            ApiError::from(e)
        })?;

        let page_count = pages.len();
        tracing::info!(request_id = rid, pages = page_count, stage = %Stage::Rasterized, "{page_count} page(s) detected");

        let mut document = OcrDocument::new();
        for page in pages {
            let number = page.number;

            tracing::info!(request_id = rid, page = number, total = page_count, "Preprocessing page");
            let preprocessor = self.preprocessor.clone();
            let encoded = tokio::task::spawn_blocking(move || preprocessor.process(page).encode())
                .await
                .map_err(|e| ApiError::Internal(format!("preprocessing task failed on page {number}: {e}")))?
                .map_err(|e| ApiError::Internal(format!("encoding page {number}: {e}")))?;

            let page_path = layout.page_path(number);
            tokio::fs::write(&page_path, &encoded.png)
                .await
                .map_err(|e| ApiError::storage("writing page image", &page_path, e))?;

            tracing::info!(request_id = rid, page = number, total = page_count, engine = engine_name, "Running OCR");
            let outcome = match engine.infer(&encoded).await {
                Ok(text) => PageOutcome::Text(text),
                Err(e) => {
                    tracing::warn!(request_id = rid, page = number, error = %e, "OCR failed for page, continuing");
                    PageOutcome::Failed(e.marker())
                }
            };
            metrics::record_page(!outcome.is_failed());
            document.push(number, outcome);
        }

        let elapsed = start.elapsed();
        let markdown = MarkdownReport {
            display_name: &identity.display_name,
            engine: engine_name,
            processing_time: elapsed,
            sha256: &envelope.sha256,
            request_id: rid,
        }
        .render(&document);
        tracing::debug!(request_id = rid, stage = %Stage::Assembled, chars = markdown.len());

        tokio::fs::write(&layout.output_path, markdown.as_bytes())
            .await
            .map_err(|e| ApiError::storage("writing markdown output", &layout.output_path, e))?;

        let failed_pages = document.failed_pages();
        tracing::info!(
            request_id = rid,
            client_ip = %request.client_ip,
            engine = engine_name,
            processing_time = format!("{:.2}", elapsed.as_secs_f64()),
            pages = page_count,
            failed_pages,
            file_hash = %envelope.sha256,
            stage = %Stage::Complete,
            "OCR completed"
        );

        Ok(OcrOutcome {
            markdown,
            download_name: identity.download_name(),
        })
    }
}

fn log_raster_error(request_id: &str, err: &RasterError) {
    match err {
        RasterError::Corrupt { detail } => {
            tracing::warn!(request_id, detail = %detail, "Uploaded document could not be decoded");
        }
        e if e.is_client_fault() => {
            tracing::warn!(request_id, error = %e, "Document rejected during rasterisation");
        }
        e => {
            tracing::error!(request_id, error = %e, "Rasterisation failed");
        }
    }
}
