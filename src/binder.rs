//! Parameter binding: uploaded files + parallel parameter lists → requests.
//!
//! Clients send N files and five parallel string lists (`formats`, `widths`,
//! `heights`, `fits`, `strips`), aligned by index. This module validates the
//! alignment once and turns every index into a structured
//! [`ConversionRequest`]; nothing past this point deals with parallel lists.
//!
//! Binding is all-or-nothing: any problem fails the whole batch with
//! [`BindError::MalformedBatch`] before a single file is converted.
//!
//! ## Field rules
//!
//! | List | Empty value | Accepted | Otherwise |
//! |---|---|---|---|
//! | `formats` | kept as-is (fails that file later) | any name, lowercased | n/a |
//! | `widths` / `heights` | no constraint | integer in `1..=max_dimension` | malformed |
//! | `fits` | `cover` | `cover` `contain` `fill` `inside` `outside` | malformed |
//! | `strips` | keep metadata | `yes/true/1/on`, `no/false/0/off` | malformed |

use crate::config::LimitsConfig;
use crate::naming::output_key;
use crate::types::{ConversionRequest, ConversionSpec, Fit, UploadedFile};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("malformed batch: {0}")]
    MalformedBatch(String),
}

fn malformed(msg: impl Into<String>) -> BindError {
    BindError::MalformedBatch(msg.into())
}

/// Boundary size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub max_dimension: u32,
}

impl BindLimits {
    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self {
            max_files: limits.max_files,
            max_file_bytes: limits.max_file_bytes,
            max_dimension: limits.max_dimension,
        }
    }
}

impl Default for BindLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

/// The decomposed upload, exactly as the transport delivered it.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub files: Vec<UploadedFile>,
    pub formats: Vec<String>,
    pub widths: Vec<String>,
    pub heights: Vec<String>,
    pub fits: Vec<String>,
    pub strips: Vec<String>,
}

impl RawBatch {
    /// Batch applying one parameter set to every file.
    pub fn uniform(
        files: Vec<UploadedFile>,
        format: &str,
        width: Option<u32>,
        height: Option<u32>,
        fit: Fit,
        strip: bool,
    ) -> Self {
        let n = files.len();
        let dim = |d: Option<u32>| d.map(|v| v.to_string()).unwrap_or_default();
        Self {
            files,
            formats: vec![format.to_string(); n],
            widths: vec![dim(width); n],
            heights: vec![dim(height); n],
            fits: vec![fit.name().to_string(); n],
            strips: vec![strip.to_string(); n],
        }
    }
}

/// Bind files and parameter lists into per-file requests, preserving order.
pub fn bind(raw: RawBatch, limits: &BindLimits) -> Result<Vec<ConversionRequest>, BindError> {
    let n = raw.files.len();
    if n == 0 {
        return Err(malformed("no files uploaded"));
    }
    if n > limits.max_files {
        return Err(malformed(format!(
            "{n} files uploaded, at most {} allowed",
            limits.max_files
        )));
    }

    for (name, len) in [
        ("formats", raw.formats.len()),
        ("widths", raw.widths.len()),
        ("heights", raw.heights.len()),
        ("fits", raw.fits.len()),
        ("strips", raw.strips.len()),
    ] {
        if len != n {
            return Err(malformed(format!(
                "{name} has {len} entries for {n} files"
            )));
        }
    }

    if let Some(big) = raw.files.iter().find(|f| f.size() > limits.max_file_bytes) {
        return Err(malformed(format!(
            "{} is {} bytes, limit is {}",
            big.original_name,
            big.size(),
            limits.max_file_bytes
        )));
    }

    let RawBatch {
        files,
        formats,
        widths,
        heights,
        fits,
        strips,
    } = raw;

    let mut params = formats
        .into_iter()
        .zip(widths)
        .zip(heights)
        .zip(fits)
        .zip(strips);

    files
        .into_iter()
        .enumerate()
        .map(|(i, file)| {
            let ((((format, width), height), fit), strip) = params
                .next()
                .ok_or_else(|| malformed(format!("missing parameters for file {i}")))?;
            let spec = ConversionSpec {
                target_format: format.trim().to_ascii_lowercase(),
                width: parse_dimension(&width, "widths", i, limits.max_dimension)?,
                height: parse_dimension(&height, "heights", i, limits.max_dimension)?,
                fit: parse_fit(&fit, i)?,
                strip_metadata: parse_strip(&strip, i)?,
            };
            let output_key = output_key(&file.original_name, &spec.target_format);
            Ok(ConversionRequest {
                file,
                spec,
                output_key,
            })
        })
        .collect()
}

/// Empty means no constraint; anything else must be a positive integer
/// no larger than `max`.
pub fn parse_dimension(
    value: &str,
    list: &str,
    index: usize,
    max: u32,
) -> Result<Option<u32>, BindError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<u32>() {
        Ok(0) | Err(_) => Err(malformed(format!(
            "{list}[{index}] must be a positive integer, got '{value}'"
        ))),
        Ok(v) if v > max => Err(malformed(format!(
            "{list}[{index}] is {v}, above the limit of {max}"
        ))),
        Ok(v) => Ok(Some(v)),
    }
}

pub fn parse_fit(value: &str, index: usize) -> Result<Fit, BindError> {
    if value.trim().is_empty() {
        return Ok(Fit::default());
    }
    value
        .parse::<Fit>()
        .map_err(|e| malformed(format!("fits[{index}]: {e}")))
}

pub fn parse_strip(value: &str, index: usize) -> Result<bool, BindError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" | "" => Ok(false),
        other => Err(malformed(format!(
            "strips[{index}] must be yes or no, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<UploadedFile> {
        names
            .iter()
            .map(|n| UploadedFile::new(*n, vec![1u8, 2, 3]))
            .collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn batch(names: &[&str]) -> RawBatch {
        let n = names.len();
        RawBatch {
            files: files(names),
            formats: vec!["webp".into(); n],
            widths: vec![String::new(); n],
            heights: vec![String::new(); n],
            fits: vec![String::new(); n],
            strips: vec!["no".into(); n],
        }
    }

    // =========================================================================
    // Alignment
    // =========================================================================

    #[test]
    fn binds_in_input_order() {
        let mut raw = batch(&["a.jpg", "b.png", "c.gif"]);
        raw.formats = strings(&["webp", "PNG", "jpg"]);
        let requests = bind(raw, &BindLimits::default()).unwrap();

        let keys: Vec<&str> = requests.iter().map(|r| r.output_key.as_str()).collect();
        assert_eq!(keys, vec!["a.webp", "b.png", "c.jpg"]);
        assert_eq!(requests[1].spec.target_format, "png");
    }

    #[test]
    fn empty_batch_is_malformed() {
        let err = bind(RawBatch::default(), &BindLimits::default()).unwrap_err();
        assert!(matches!(err, BindError::MalformedBatch(_)));
    }

    #[test]
    fn each_short_list_is_malformed() {
        for list in 0..5 {
            let mut raw = batch(&["a.jpg", "b.jpg"]);
            match list {
                0 => raw.formats.pop(),
                1 => raw.widths.pop(),
                2 => raw.heights.pop(),
                3 => raw.fits.pop(),
                _ => raw.strips.pop(),
            };
            assert!(
                matches!(
                    bind(raw, &BindLimits::default()),
                    Err(BindError::MalformedBatch(_))
                ),
                "list {list} shorter than files should fail"
            );
        }
    }

    #[test]
    fn long_list_is_malformed() {
        let mut raw = batch(&["a.jpg"]);
        raw.widths.push("100".into());
        assert!(bind(raw, &BindLimits::default()).is_err());
    }

    // =========================================================================
    // Limits
    // =========================================================================

    #[test]
    fn too_many_files_is_malformed() {
        let limits = BindLimits {
            max_files: 2,
            ..BindLimits::default()
        };
        assert!(bind(batch(&["a", "b", "c"]), &limits).is_err());
        assert!(bind(batch(&["a", "b"]), &limits).is_ok());
    }

    #[test]
    fn oversized_file_is_malformed() {
        let limits = BindLimits {
            max_file_bytes: 2,
            ..BindLimits::default()
        };
        let err = bind(batch(&["big.jpg"]), &limits).unwrap_err();
        assert!(err.to_string().contains("big.jpg"));
    }

    // =========================================================================
    // Field parsing
    // =========================================================================

    #[test]
    fn empty_dimensions_mean_no_constraint() {
        let mut raw = batch(&["a.jpg", "b.jpg"]);
        raw.widths = strings(&["", "640"]);
        raw.heights = strings(&[" ", ""]);
        let requests = bind(raw, &BindLimits::default()).unwrap();

        assert_eq!(requests[0].spec.width, None);
        assert_eq!(requests[0].spec.height, None);
        assert_eq!(requests[1].spec.width, Some(640));
    }

    #[test]
    fn invalid_dimensions_are_malformed() {
        for bad in ["0", "-5", "wide", "1.5"] {
            assert!(parse_dimension(bad, "widths", 0, 16_384).is_err(), "{bad}");
        }
    }

    #[test]
    fn dimension_above_limit_is_malformed() {
        assert_eq!(parse_dimension("16384", "widths", 0, 16_384), Ok(Some(16_384)));
        let err = parse_dimension("16385", "heights", 2, 16_384).unwrap_err();
        assert!(err.to_string().contains("heights[2]"));
    }

    #[test]
    fn huge_dimension_fails_whole_batch() {
        let limits = BindLimits {
            max_dimension: 1000,
            ..BindLimits::default()
        };
        let mut raw = batch(&["a.jpg", "b.jpg"]);
        raw.widths = strings(&["800", "60000"]);
        assert!(matches!(
            bind(raw, &limits),
            Err(BindError::MalformedBatch(_))
        ));
    }

    #[test]
    fn fit_defaults_to_cover() {
        assert_eq!(parse_fit("", 0), Ok(Fit::Cover));
        assert_eq!(parse_fit("Contain", 0), Ok(Fit::Contain));
        assert!(parse_fit("squash", 0).is_err());
    }

    #[test]
    fn strip_flag_values() {
        for yes in ["yes", "YES", "true", "1", "on"] {
            assert_eq!(parse_strip(yes, 0), Ok(true), "{yes}");
        }
        for no in ["no", "false", "0", "off", ""] {
            assert_eq!(parse_strip(no, 0), Ok(false), "{no}");
        }
        assert!(parse_strip("maybe", 0).is_err());
    }

    #[test]
    fn unknown_format_still_binds() {
        let mut raw = batch(&["a.jpg"]);
        raw.formats = strings(&["bmp"]);
        let requests = bind(raw, &BindLimits::default()).unwrap();
        assert_eq!(requests[0].spec.target_format, "bmp");
        assert_eq!(requests[0].output_key, "a.bmp");
    }

    #[test]
    fn duplicate_names_bind_independently() {
        let mut raw = batch(&["photo.png", "photo.jpg"]);
        raw.widths = strings(&["100", "200"]);
        let requests = bind(raw, &BindLimits::default()).unwrap();
        assert_eq!(requests[0].output_key, requests[1].output_key);
        assert_eq!(requests[0].spec.width, Some(100));
        assert_eq!(requests[1].spec.width, Some(200));
    }

    #[test]
    fn uniform_batch_repeats_parameters() {
        let raw = RawBatch::uniform(
            files(&["a.jpg", "b.jpg"]),
            "avif",
            Some(300),
            None,
            Fit::Inside,
            true,
        );
        let requests = bind(raw, &BindLimits::default()).unwrap();
        for r in &requests {
            assert_eq!(r.spec.target_format, "avif");
            assert_eq!(r.spec.width, Some(300));
            assert_eq!(r.spec.height, None);
            assert_eq!(r.spec.fit, Fit::Inside);
            assert!(r.spec.strip_metadata);
        }
    }
}
