use std::io::Cursor;

use axum::body::Bytes;
use image::{DynamicImage, ImageFormat};

/// One rendered page. `number` is 1-based and follows document order.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub number: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn new(number: usize, image: DynamicImage) -> Self {
        Self { number, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Lossless PNG encoding, used both on disk and on the wire.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }

    /// CPU-bound; call from a blocking task.
    pub fn encode(&self) -> Result<EncodedPage, image::ImageError> {
        Ok(EncodedPage {
            number: self.number,
            png: Bytes::from(self.to_png()?),
        })
    }
}

/// A preprocessed page as PNG bytes. Written to disk and sent to the engine
/// without re-encoding.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub number: usize,
    pub png: Bytes,
}
