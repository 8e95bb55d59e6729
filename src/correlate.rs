//! Result correlation: outcomes → response records, in upload order.
//!
//! Records are matched to uploads by position, never by filename, so two
//! uploads called `photo.jpg` each get their own record.

use crate::imaging::OutputFormat;
use crate::types::{BatchResult, ConversionOutcome, ErrorKind};
use serde::Serialize;

/// A converted and stored image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedRecord {
    pub original_name: String,
    pub output_key: String,
    pub output_format: OutputFormat,
    pub object_url: String,
    /// Encoded size in KiB (`bytes / 1024`, unrounded).
    #[serde(rename = "byteSizeKB")]
    pub byte_size_kb: f64,
}

/// An upload that produced no object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub original_name: String,
    pub error_kind: ErrorKind,
}

/// One response record per uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImageRecord {
    Converted(ConvertedRecord),
    Failed(FailedRecord),
}

impl ImageRecord {
    pub fn original_name(&self) -> &str {
        match self {
            Self::Converted(r) => &r.original_name,
            Self::Failed(r) => &r.original_name,
        }
    }
}

/// Body of a successful upload response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub converted_image_data: Vec<ImageRecord>,
}

/// Bytes → KiB, as reported in `byteSizeKB`.
pub fn kib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

/// Pair `names[i]` with `result.outcomes[i]`.
///
/// A name with no outcome at its position is reported as an internal error.
pub fn correlate(names: &[String], result: &BatchResult) -> Vec<ImageRecord> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| match result.outcomes.get(i) {
            Some(ConversionOutcome::Success {
                output_key,
                output_format,
                encoded_byte_size,
                object_url,
            }) => ImageRecord::Converted(ConvertedRecord {
                original_name: name.clone(),
                output_key: output_key.clone(),
                output_format: *output_format,
                object_url: object_url.clone(),
                byte_size_kb: kib(*encoded_byte_size),
            }),
            Some(ConversionOutcome::Failure { error_kind, .. }) => {
                ImageRecord::Failed(FailedRecord {
                    original_name: name.clone(),
                    error_kind: *error_kind,
                })
            }
            None => ImageRecord::Failed(FailedRecord {
                original_name: name.clone(),
                error_kind: ErrorKind::InternalError,
            }),
        })
        .collect()
}

/// Aggregate counts for logs and the CLI report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
}

pub fn summarize(result: &BatchResult) -> BatchSummary {
    result
        .outcomes
        .iter()
        .fold(BatchSummary::default(), |mut acc, outcome| {
            match outcome {
                ConversionOutcome::Success {
                    encoded_byte_size, ..
                } => {
                    acc.succeeded += 1;
                    acc.bytes += encoded_byte_size;
                }
                ConversionOutcome::Failure { .. } => acc.failed += 1,
            }
            acc
        })
}
