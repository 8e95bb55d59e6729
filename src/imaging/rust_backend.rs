//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image` crate, format sniffed from content |
//! | ICC profile | `ImageDecoder::icc_profile` → `ImageEncoder::set_icc_profile` |
//! | EXIF | `ImageDecoder::exif_metadata` → `ImageEncoder::set_exif_metadata` |
//! | Resize | `image::imageops` with `Lanczos3` filter |
//! | Cover crop / contain pad | `crop_imm` / `imageops::overlay` |
//! | Encode → JPEG | `JpegEncoder` (quality) |
//! | Encode → PNG | `PngEncoder` |
//! | Encode → WebP | `WebPEncoder` (lossless) |
//! | Encode → AVIF | `AvifEncoder` (rav1e, configurable speed) |
//! | Encode → GIF | `GifEncoder` via `write_to` |
//!
//! Metadata survives into every target except GIF, whose container has no
//! slot for it.
//!
//! AVIF is not a readable *source*: the `image` crate's `"avif"` feature only
//! enables the encoder. AVIF uploads fail as undecodable.

use super::backend::{ConvertError, Converted, Dimensions, ImageBackend};
use super::calculations::{ResizePlan, center_offset, plan_resize};
use super::params::{ConvertParams, OutputFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{
    DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader, Rgba, RgbaImage,
};
use std::io::Cursor;
use tracing::debug;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded pixels plus the metadata worth carrying to the output.
struct Decoded {
    image: DynamicImage,
    icc: Option<Vec<u8>>,
    exif: Option<Vec<u8>>,
}

/// Sniff the container from its magic bytes and decode it.
fn decode(source: &[u8]) -> Result<Decoded, ConvertError> {
    let reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| ConvertError::UnsupportedSource(e.to_string()))?;

    let Some(format) = reader.format() else {
        return Err(ConvertError::UnsupportedSource(
            "unrecognized image format".into(),
        ));
    };

    let mut decoder = reader.into_decoder().map_err(|e| {
        ConvertError::UnsupportedSource(format!("no decoder for {format:?}: {e}"))
    })?;
    let icc = decoder.icc_profile().ok().flatten();
    let exif = decoder.exif_metadata().ok().flatten();
    let image = DynamicImage::from_decoder(decoder)
        .map_err(|e| ConvertError::UnsupportedSource(format!("failed to decode {format:?}: {e}")))?;

    Ok(Decoded { image, icc, exif })
}

/// Apply a resize plan to decoded pixels.
fn apply_plan(img: DynamicImage, plan: ResizePlan) -> DynamicImage {
    match plan {
        ResizePlan::Keep => img,
        ResizePlan::Exact { width, height } => img.resize_exact(width, height, FilterType::Lanczos3),
        ResizePlan::Crop { scaled, crop } => {
            let filled = img.resize_exact(scaled.0, scaled.1, FilterType::Lanczos3);
            let (x, y) = center_offset(scaled, crop);
            filled.crop_imm(x, y, crop.0, crop.1)
        }
        ResizePlan::Pad { scaled, canvas } => {
            let fitted = img
                .resize_exact(scaled.0, scaled.1, FilterType::Lanczos3)
                .to_rgba8();
            let mut background = RgbaImage::from_pixel(canvas.0, canvas.1, Rgba([0, 0, 0, 255]));
            let (x, y) = center_offset(canvas, scaled);
            imageops::overlay(&mut background, &fitted, i64::from(x), i64::from(y));
            DynamicImage::ImageRgba8(background)
        }
    }
}

/// Reduce to the 8-bit layout the target encoder accepts.
fn normalize_for(img: DynamicImage, format: OutputFormat) -> DynamicImage {
    match format {
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        OutputFormat::Png => img,
        OutputFormat::Webp | OutputFormat::Avif | OutputFormat::Gif => {
            if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            }
        }
    }
}

/// Source metadata carried to the encoder. Empty when stripped.
#[derive(Default)]
struct Metadata {
    icc: Option<Vec<u8>>,
    exif: Option<Vec<u8>>,
}

fn attach_metadata(encoder: &mut impl ImageEncoder, metadata: Metadata, format: OutputFormat) {
    if let Some(profile) = metadata.icc {
        if let Err(e) = encoder.set_icc_profile(profile) {
            debug!(%format, error = %e, "encoder does not take ICC profiles");
        }
    }
    if let Some(exif) = metadata.exif {
        if let Err(e) = encoder.set_exif_metadata(exif) {
            debug!(%format, error = %e, "encoder does not take EXIF, dropped");
        }
    }
}

fn encode_failed(format: OutputFormat) -> impl Fn(image::ImageError) -> ConvertError {
    move |e| ConvertError::Internal(format!("{format} encode failed: {e}"))
}

/// Encode to the target format with whatever metadata survived.
fn encode(
    img: &DynamicImage,
    params: &ConvertParams,
    metadata: Metadata,
) -> Result<Vec<u8>, ConvertError> {
    let format = params.format;
    let mut buf = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, params.quality.as_u8());
            attach_metadata(&mut encoder, metadata, format);
            img.write_with_encoder(encoder)
                .map_err(encode_failed(format))?;
        }
        OutputFormat::Png => {
            let mut encoder = PngEncoder::new(&mut buf);
            attach_metadata(&mut encoder, metadata, format);
            img.write_with_encoder(encoder)
                .map_err(encode_failed(format))?;
        }
        OutputFormat::Webp => {
            let mut encoder = WebPEncoder::new_lossless(&mut buf);
            attach_metadata(&mut encoder, metadata, format);
            img.write_with_encoder(encoder)
                .map_err(encode_failed(format))?;
        }
        OutputFormat::Avif => {
            let mut encoder = AvifEncoder::new_with_speed_quality(
                &mut buf,
                params.avif_speed.clamp(1, 10),
                params.quality.as_u8(),
            );
            attach_metadata(&mut encoder, metadata, format);
            img.write_with_encoder(encoder)
                .map_err(encode_failed(format))?;
        }
        OutputFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
                .map_err(encode_failed(format))?;
        }
    }

    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn convert(&self, source: &[u8], params: &ConvertParams) -> Result<Converted, ConvertError> {
        let Decoded { image, icc, exif } = decode(source)?;

        let plan = plan_resize(
            (image.width(), image.height()),
            params.width,
            params.height,
            params.fit,
        );
        let peak = plan.peak_pixels();
        if peak > params.max_output_pixels {
            return Err(ConvertError::UnsupportedTarget(format!(
                "resize needs {peak} pixels, above the limit of {}",
                params.max_output_pixels
            )));
        }
        let resized = normalize_for(apply_plan(image, plan), params.format);
        let dimensions = Dimensions {
            width: resized.width(),
            height: resized.height(),
        };

        let metadata = if params.strip_metadata {
            Metadata::default()
        } else if !params.format.carries_exif() {
            if exif.is_some() {
                debug!(format = %params.format, "target has no EXIF slot, dropped");
            }
            Metadata { icc, exif: None }
        } else {
            Metadata { icc, exif }
        };
        let bytes = encode(&resized, params, metadata)?;

        Ok(Converted {
            bytes,
            format: params.format,
            dimensions,
        })
    }
}
