//! OCR processing pipeline.
//!
//! # Data Flow
//! ```text
//! UploadEnvelope
//!     → rasterize.rs (PDF pages / decoded image, on the blocking pool)
//!     → preprocess.rs (RGB8, detected + fixed rotation, PNG encode)
//!     → engine (one inference call per encoded page)
//!     → markdown.rs (report)
//! orchestrator.rs drives the whole sequence and owns the storage writes.
//! ```

pub mod markdown;
pub mod orchestrator;
pub mod page;
pub mod preprocess;
pub mod rasterize;

pub use orchestrator::{OcrOutcome, OcrRequest, Orchestrator};
pub use page::{EncodedPage, PageImage};
pub use preprocess::{DefaultPreprocessor, OrientationDetector, Preprocessor, TesseractOsd};
pub use rasterize::{DocumentRasterizer, RasterError, RasterLimits, Rasterizer};
