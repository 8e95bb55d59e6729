//! High-level image operations.
//!
//! These functions combine per-file parameters with process-wide encoder
//! settings and call the backend.

use super::backend::{ConvertError, Converted, ImageBackend};
use super::params::{ConvertParams, EncodeSettings, OutputFormat};
use crate::types::ConversionSpec;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Resolve a requested format name against the enabled set.
pub fn resolve_format(name: &str, settings: &EncodeSettings) -> Result<OutputFormat> {
    OutputFormat::from_name(name)
        .filter(|f| settings.enabled_formats.contains(f))
        .ok_or_else(|| ConvertError::UnsupportedTarget(name.to_string()))
}

/// Plan a conversion without executing it.
///
/// Useful for testing parameter generation.
pub fn plan_conversion(spec: &ConversionSpec, settings: &EncodeSettings) -> Result<ConvertParams> {
    Ok(ConvertParams {
        format: resolve_format(&spec.target_format, settings)?,
        width: spec.width,
        height: spec.height,
        fit: spec.fit,
        strip_metadata: spec.strip_metadata,
        quality: settings.quality,
        avif_speed: settings.avif_speed,
        max_output_pixels: settings.max_output_pixels,
    })
}

/// Convert one source image according to its spec.
///
/// An unknown or disabled target format fails before any decoding happens.
pub fn convert_image(
    backend: &dyn ImageBackend,
    source: &[u8],
    spec: &ConversionSpec,
    settings: &EncodeSettings,
) -> Result<Converted> {
    let params = plan_conversion(spec, settings)?;
    backend.convert(source, &params)
}
