//! Page preprocessing before inference.
//!
//! Pages are normalized to RGB8, then turned upright. The upright angle comes
//! from an optional [`OrientationDetector`] plus the configured fixed rotation.
//! A failed detection is logged and treated as "already upright".

use std::fmt;
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;

use crate::config::PreprocessConfig;
use crate::pipeline::page::PageImage;

pub trait Preprocessor: Send + Sync {
    fn process(&self, page: PageImage) -> PageImage;
}

/// Clockwise quarter turns applied to every page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Anything other than a quarter turn is treated as no rotation;
    /// config validation rejects such values up front.
    pub fn from_degrees(degrees: u16) -> Self {
        match degrees % 360 {
            90 => Self::Cw90,
            180 => Self::Cw180,
            270 => Self::Cw270,
            _ => Self::None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    fn then(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees())
    }
}

#[derive(Debug, Error)]
pub enum OrientationError {
    #[error("failed to start orientation detector: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("failed to encode page for orientation detection: {0}")]
    Encode(#[from] image::ImageError),

    #[error("orientation detector exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("orientation detector output has no usable rotation")]
    Unparsable,
}

/// Reports how far a page must be turned clockwise to read upright.
pub trait OrientationDetector: Send + Sync + fmt::Debug {
    fn detect(&self, page: &PageImage) -> Result<Rotation, OrientationError>;
}

/// Orientation and script detection through the `tesseract` binary
/// (`--psm 0`). Blocking; runs on the preprocessing thread.
#[derive(Debug, Clone)]
pub struct TesseractOsd {
    binary: String,
}

impl TesseractOsd {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl OrientationDetector for TesseractOsd {
    fn detect(&self, page: &PageImage) -> Result<Rotation, OrientationError> {
        let png = page.to_png()?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--psm", "0"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from its own thread so a chatty child cannot block us.
        let stdin = child.stdin.take();
        let feeder = std::thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        });

        let output = child.wait_with_output()?;
        // A broken pipe here just means tesseract gave up early; its exit
        // status says why.
        let _ = feeder.join();

        if !output.status.success() {
            return Err(OrientationError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_osd_rotation(&String::from_utf8_lossy(&output.stdout)).ok_or(OrientationError::Unparsable)
    }
}

/// Reads the `Rotate: <deg>` line of tesseract OSD output.
pub fn parse_osd_rotation(osd: &str) -> Option<Rotation> {
    let line = osd.lines().find(|line| line.trim_start().starts_with("Rotate:"))?;
    let degrees: u16 = line.split(':').nth(1)?.trim().parse().ok()?;
    matches!(degrees, 0 | 90 | 180 | 270).then(|| Rotation::from_degrees(degrees))
}

/// Normalizes every page to RGB8, de-rotates it when a detector is set and
/// applies the configured fixed rotation.
#[derive(Debug, Clone, Default)]
pub struct DefaultPreprocessor {
    rotation: Rotation,
    detector: Option<Arc<dyn OrientationDetector>>,
}

impl DefaultPreprocessor {
    pub fn new(rotation: Rotation) -> Self {
        Self {
            rotation,
            detector: None,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn OrientationDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn from_config(config: &PreprocessConfig) -> Self {
        let preprocessor = Self::new(Rotation::from_degrees(config.rotate_degrees));
        if config.detect_orientation {
            preprocessor.with_detector(Arc::new(TesseractOsd::new(config.tesseract_path.as_str())))
        } else {
            preprocessor
        }
    }

    fn detected_rotation(&self, page: &PageImage) -> Rotation {
        let Some(detector) = &self.detector else {
            return Rotation::None;
        };
        match detector.detect(page) {
            Ok(rotation) => rotation,
            Err(e) => {
                tracing::warn!(page = page.number, error = %e, "Could not detect rotation, assuming upright");
                Rotation::None
            }
        }
    }
}

impl Preprocessor for DefaultPreprocessor {
    fn process(&self, page: PageImage) -> PageImage {
        let rgb = match page.image {
            DynamicImage::ImageRgb8(_) => page.image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        let page = PageImage::new(page.number, rgb);

        let rotation = self.detected_rotation(&page).then(self.rotation);
        if rotation == Rotation::None {
            return page;
        }

        tracing::info!(page = page.number, degrees = rotation.degrees(), "Rotating page");
        let image = match rotation {
            Rotation::None => page.image,
            Rotation::Cw90 => page.image.rotate90(),
            Rotation::Cw180 => page.image.rotate180(),
            Rotation::Cw270 => page.image.rotate270(),
        };
        PageImage::new(page.number, image)
    }
}
