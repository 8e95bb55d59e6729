//! Shared test utilities for the ampe-convert test suite.
//!
//! Synthesizes small source images in memory so backend and pipeline tests
//! never depend on fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let jpeg = jpeg_bytes(200, 150);
//! let file = uploaded("photo.jpg", jpeg);
//! let request = request_for(file, "webp");
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader, RgbImage, RgbaImage};
use std::io::Cursor;

use crate::naming::output_key;
use crate::types::{ConversionRequest, ConversionSpec, Fit, UploadedFile};

// =========================================================================
// Source images
// =========================================================================

/// Gradient RGB JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Half-transparent RGBA PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, 64, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// Little-endian TIFF block with one IFD entry (Orientation = 1).
pub fn exif_payload() -> Vec<u8> {
    vec![
        b'I', b'I', 42, 0, 8, 0, 0, 0, // header, IFD at 8
        1, 0, // one entry
        0x12, 0x01, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0, // 0x0112 SHORT x1 = 1
        0, 0, 0, 0, // no next IFD
    ]
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// JPEG carrying [`exif_payload`] in its APP1 segment.
pub fn jpeg_with_exif(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new(&mut buf);
    encoder.set_exif_metadata(exif_payload()).unwrap();
    encoder
        .write_image(gradient(width, height).as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Lossless WebP carrying [`exif_payload`] in its EXIF chunk.
pub fn webp_with_exif(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = WebPEncoder::new_lossless(&mut buf);
    encoder.set_exif_metadata(exif_payload()).unwrap();
    encoder
        .write_image(gradient(width, height).as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// EXIF block of an encoded image, as the `image` decoders report it.
pub fn read_exif(bytes: &[u8]) -> Option<Vec<u8>> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .unwrap()
        .into_decoder()
        .unwrap()
        .exif_metadata()
        .unwrap()
}

// =========================================================================
// Requests
// =========================================================================

pub fn uploaded(name: &str, bytes: Vec<u8>) -> UploadedFile {
    UploadedFile::new(name, bytes)
}

/// Request with default parameters (no resize, cover, metadata kept).
pub fn request_for(file: UploadedFile, format: &str) -> ConversionRequest {
    request_with(file, format, None, None, Fit::Cover)
}

pub fn request_with(
    file: UploadedFile,
    format: &str,
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
) -> ConversionRequest {
    let output_key = output_key(&file.original_name, format);
    ConversionRequest {
        file,
        spec: ConversionSpec {
            target_format: format.to_string(),
            width,
            height,
            fit,
            strip_metadata: false,
        },
        output_key,
    }
}
