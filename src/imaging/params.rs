//! Parameter types for image conversions.
//!
//! These types describe *what* to produce, not *how* to produce it. They are
//! the interface between [`operations`](super::operations) (which resolves a
//! per-file [`ConversionSpec`](crate::types::ConversionSpec) against the
//! configured encoder settings) and the [`backend`](super::backend) (which
//! does the pixel work). Swapping the backend for a mock in tests does not
//! touch any of this.
//!
//! ## Types
//!
//! - [`OutputFormat`]: the closed set of encodable targets.
//! - [`Quality`]: lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`EncodeSettings`]: process-wide encoder knobs taken from config.
//! - [`ConvertParams`]: everything the backend needs for one file.

use crate::types::Fit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target encodings the conversion engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Avif,
    Gif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Webp,
        OutputFormat::Png,
        OutputFormat::Jpeg,
        OutputFormat::Avif,
        OutputFormat::Gif,
    ];

    /// Resolve a user-supplied format name. Case-insensitive; `jpg` is an alias.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "webp" => Some(Self::Webp),
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "avif" => Some(Self::Avif),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Avif => "avif",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Avif => "image/avif",
            Self::Gif => "image/gif",
        }
    }

    /// Whether a source EXIF block survives re-encoding into this format.
    /// The GIF container has no EXIF slot.
    pub fn carries_exif(self) -> bool {
        !matches!(self, Self::Gif)
    }

    /// Whether the encoded output can hold an alpha channel.
    pub fn has_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality as the `u8` the `image` encoders expect.
    pub fn as_u8(self) -> u8 {
        self.0.clamp(1, 100) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Encoder settings shared by every file in a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub quality: Quality,
    /// rav1e speed preset, 1 (slowest) to 10 (fastest).
    pub avif_speed: u8,
    /// Formats this deployment accepts as conversion targets.
    pub enabled_formats: Vec<OutputFormat>,
    /// Largest resize buffer, in pixels, a single conversion may allocate.
    pub max_output_pixels: u64,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            avif_speed: 6,
            enabled_formats: OutputFormat::ALL.to_vec(),
            max_output_pixels: 40_000_000,
        }
    }
}

/// Everything the backend needs to convert one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertParams {
    pub format: OutputFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub strip_metadata: bool,
    pub quality: Quality,
    pub avif_speed: u8,
    pub max_output_pixels: u64,
}
