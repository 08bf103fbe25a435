//! Document rasterisation: uploaded bytes → ordered page images.
//!
//! ## Why spawn_blocking?
//!
//! pdfium and the image decoders are CPU-bound C/Rust code with no await
//! points. [`rasterize_blocking`] moves the work onto the blocking pool so
//! the Tokio workers keep serving other connections.
//!
//! ## Decompression bombs
//!
//! Page count is checked before a single PDF page is rendered, and image
//! dimensions are read from the header before any pixel is decoded.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use image::{DynamicImage, ImageReader, Limits};
use pdfium_render::prelude::*;
use thiserror::Error;

use crate::config::RenderConfig;
use crate::pipeline::page::PageImage;

const PDF_POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("PDF has {pages} pages. Maximum allowed: {max}.")]
    TooManyPages { pages: usize, max: usize },

    #[error("Image dimensions ({width}x{height}) exceed limit ({limit}x{limit}).")]
    DimensionsExceeded { width: u32, height: u32, limit: u32 },

    #[error("Could not decode the uploaded file.")]
    Corrupt { detail: String },

    #[error("Unsupported document type '{0}'.")]
    Unsupported(String),

    #[error("PDF renderer unavailable: {0}")]
    Library(String),

    #[error("failed to render page {page}: {detail}")]
    Render { page: usize, detail: String },

    #[error("rasterisation task failed: {0}")]
    Task(String),
}

impl RasterError {
    /// Errors caused by the uploaded document rather than the server.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::TooManyPages { .. }
                | Self::DimensionsExceeded { .. }
                | Self::Corrupt { .. }
                | Self::Unsupported(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterLimits {
    pub max_pdf_pages: usize,
    pub max_dimension: u32,
    pub dpi: u32,
}

impl RasterLimits {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            max_pdf_pages: config.max_pdf_pages,
            max_dimension: config.max_image_dimension,
            dpi: config.dpi,
        }
    }

    pub fn check_page_count(&self, pages: usize) -> Result<(), RasterError> {
        if pages > self.max_pdf_pages {
            return Err(RasterError::TooManyPages {
                pages,
                max: self.max_pdf_pages,
            });
        }
        Ok(())
    }

    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), RasterError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(RasterError::DimensionsExceeded {
                width,
                height,
                limit: self.max_dimension,
            });
        }
        Ok(())
    }
}

pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        bytes: &[u8],
        ext: &str,
        limits: &RasterLimits,
    ) -> Result<Vec<PageImage>, RasterError>;
}

/// Run a rasterizer on the blocking pool.
pub async fn rasterize_blocking(
    rasterizer: Arc<dyn Rasterizer>,
    bytes: Bytes,
    ext: String,
    limits: RasterLimits,
) -> Result<Vec<PageImage>, RasterError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, &ext, &limits))
        .await
        .map_err(|e| RasterError::Task(e.to_string()))?
}

/// Decode a PNG or JPEG after checking its header dimensions.
pub fn decode_image(bytes: &[u8], limits: &RasterLimits) -> Result<DynamicImage, RasterError> {
    let (width, height) = image_reader(bytes)?.into_dimensions().map_err(corrupt)?;
    limits.check_dimensions(width, height)?;

    let mut decoder_limits = Limits::default();
    decoder_limits.max_image_width = Some(limits.max_dimension);
    decoder_limits.max_image_height = Some(limits.max_dimension);

    let mut decoder = image_reader(bytes)?;
    decoder.limits(decoder_limits);
    let image = decoder.decode().map_err(corrupt)?;

    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

fn image_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, RasterError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RasterError::Corrupt {
            detail: e.to_string(),
        })
}

fn corrupt(e: image::ImageError) -> RasterError {
    RasterError::Corrupt {
        detail: e.to_string(),
    }
}

/// pdfium for PDF, the `image` crate for PNG and JPEG.
#[derive(Debug, Clone, Default)]
pub struct DocumentRasterizer {
    library_path: Option<PathBuf>,
}

impl DocumentRasterizer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            library_path: config.pdfium_library_path.as_ref().map(PathBuf::from),
        }
    }

    /// A directory is searched for the platform library name; anything else
    /// is taken as the library file itself.
    fn bind(&self) -> Result<Pdfium, RasterError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(&path.join(Pdfium::pdfium_platform_library_name()))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RasterError::Library(e.to_string()))?;
        Ok(Pdfium::new(bindings))
    }

    /// Check once at startup that pdfium can be loaded.
    pub fn probe(&self) -> Result<(), RasterError> {
        self.bind().map(|_| ())
    }

    fn render_pdf(&self, bytes: &[u8], limits: &RasterLimits) -> Result<Vec<PageImage>, RasterError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RasterError::Corrupt {
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        let total = pages.len() as usize;
        limits.check_page_count(total)?;
        tracing::debug!(pages = total, dpi = limits.dpi, "PDF loaded");

        let scale = limits.dpi as f32 / PDF_POINTS_PER_INCH;
        let max = (limits.max_dimension.min(i32::MAX as u32) as i32).max(1);
        let mut rendered = Vec::with_capacity(total);

        for (index, page) in pages.iter().enumerate() {
            let number = index + 1;
            let width = ((page.width().value * scale).round() as i32).clamp(1, max);
            let config = PdfRenderConfig::new()
                .set_target_width(width)
                .set_maximum_width(max)
                .set_maximum_height(max);

            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| RasterError::Render {
                    page: number,
                    detail: format!("{e:?}"),
                })?;
            let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
            tracing::debug!(page = number, width = image.width(), height = image.height(), "Rendered page");
            rendered.push(PageImage::new(number, image));
        }

        Ok(rendered)
    }
}

impl Rasterizer for DocumentRasterizer {
    fn rasterize(
        &self,
        bytes: &[u8],
        ext: &str,
        limits: &RasterLimits,
    ) -> Result<Vec<PageImage>, RasterError> {
        match ext {
            "pdf" => self.render_pdf(bytes, limits),
            "png" | "jpg" | "jpeg" => Ok(vec![PageImage::new(1, decode_image(bytes, limits)?)]),
            other => Err(RasterError::Unsupported(other.to_string())),
        }
    }
}
