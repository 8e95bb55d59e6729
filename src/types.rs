//! Shared types that flow through the conversion pipeline.
//!
//! ```text
//! UploadedFile + ConversionSpec ──bind──▶ ConversionRequest ──run──▶ ConversionOutcome
//! ```
//!
//! Nothing here survives the request: the object store entries are the only
//! durable artifact.

use crate::imaging::OutputFormat;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One uploaded image, fully buffered.
///
/// `bytes` is reference-counted so handing it to a worker thread never copies
/// the payload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename. Used only for its stem and for display.
    pub original_name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Rule for reconciling the source aspect ratio with the requested bounds.
///
/// Only consulted when both width and height are given; a single bound always
/// scales proportionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Scale to cover both bounds, center-crop the excess.
    #[default]
    Cover,
    /// Scale to fit within both bounds, letterbox the remainder.
    Contain,
    /// Stretch to exactly the bounds, ignoring aspect ratio.
    Fill,
    /// Largest size with both sides ≤ the bounds.
    Inside,
    /// Smallest size with both sides ≥ the bounds.
    Outside,
}

impl Fit {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Contain => "contain",
            Self::Fill => "fill",
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Fit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fill" => Ok(Self::Fill),
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            other => Err(format!("unknown fit '{other}'")),
        }
    }
}

/// Per-file conversion parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSpec {
    /// Requested target format, lowercased as supplied. Resolved against the
    /// enabled format set at conversion time, so an unknown name fails only
    /// its own file.
    pub target_format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub strip_metadata: bool,
}

/// One file paired with its parameters and the key it will be stored under.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file: UploadedFile,
    pub spec: ConversionSpec,
    /// `stem(original_name) + "." + target_format`.
    pub output_key: String,
}

/// Per-file failure classification reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedSource,
    UnsupportedTarget,
    StoreUnavailable,
    StoreRejected,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedSource => "UnsupportedSource",
            Self::UnsupportedTarget => "UnsupportedTarget",
            Self::StoreUnavailable => "StoreUnavailable",
            Self::StoreRejected => "StoreRejected",
            Self::InternalError => "InternalError",
        };
        f.write_str(s)
    }
}

/// Result of the pipeline for one file. Success or failure, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Success {
        output_key: String,
        output_format: OutputFormat,
        /// Exact length of the encoded bytes the store accepted.
        encoded_byte_size: u64,
        object_url: String,
    },
    Failure {
        original_name: String,
        error_kind: ErrorKind,
        /// Human-readable cause, kept for logs and the CLI report.
        message: String,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure(
        original_name: impl Into<String>,
        error_kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Failure {
            original_name: original_name.into(),
            error_kind,
            message: message.into(),
        }
    }
}

/// Outcomes in input order: `outcomes[i]` belongs to request `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResult {
    pub outcomes: Vec<ConversionOutcome>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}
