//! Image decoding and encoding

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::{Error, Result};

/// JPEG quality used for watermarked output
pub const JPEG_QUALITY: u8 = 92;

/// Raster container formats the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
    Webp,
}

impl RasterFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
            RasterFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Webp => "webp",
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(RasterFormat::Png),
            ImageFormat::Jpeg => Some(RasterFormat::Jpeg),
            ImageFormat::WebP => Some(RasterFormat::Webp),
            _ => None,
        }
    }
}

/// Identify a supported raster format from magic bytes
pub fn sniff(bytes: &[u8]) -> Option<RasterFormat> {
    image::guess_format(bytes)
        .ok()
        .and_then(RasterFormat::from_image_format)
}

/// Decode an image into RGBA pixels
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidInput(format!("cannot decode image: {}", e)))?;
    Ok(image.to_rgba8())
}

/// Encode RGBA pixels. JPEG drops the alpha channel.
pub fn encode(image: RgbaImage, format: RasterFormat) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        RasterFormat::Png => {
            DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        RasterFormat::Webp => {
            DynamicImage::ImageRgba8(image)
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        }
        RasterFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            DynamicImage::ImageRgb8(rgb).write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}
