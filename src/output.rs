//! CLI output formatting for `ampe-convert convert`.
//!
//! Output is file-centric: one header line per input, in input order, with
//! the stored URL or the failure cause as an indented context line.
//!
//! ```text
//! 001 dawn.jpg → dawn.webp (48.2 KB)
//!     https://images.s3.eu-central-1.amazonaws.com/dawn.webp
//! 002 notes.txt ✗ UnsupportedSource
//!     image source is not a decodable raster image: format could not be determined
//!
//! Converted 1 of 2 files, 48.2 KB uploaded
//! ```
//!
//! [`format_batch_report`] is pure and returns lines for testability;
//! [`print_batch_report`] writes them to stdout.

use crate::correlate::{kib, summarize};
use crate::types::{BatchResult, ConversionOutcome, ErrorKind};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_kb(bytes: u64) -> String {
    format!("{:.1} KB", kib(bytes))
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Format one line pair per input file, then a summary line.
///
/// `names[i]` is the display name of input `i`; a name without an outcome is
/// shown as an internal error.
pub fn format_batch_report(names: &[String], result: &BatchResult) -> Vec<String> {
    let mut lines = Vec::new();

    for (i, name) in names.iter().enumerate() {
        let header = format!("{} {}", format_index(i + 1), name);
        match result.outcomes.get(i) {
            Some(ConversionOutcome::Success {
                output_key,
                encoded_byte_size,
                object_url,
                ..
            }) => {
                lines.push(format!(
                    "{header} → {output_key} ({})",
                    format_kb(*encoded_byte_size)
                ));
                lines.push(format!("{}{}", indent(1), object_url));
            }
            Some(ConversionOutcome::Failure {
                error_kind,
                message,
                ..
            }) => {
                lines.push(format!("{header} ✗ {error_kind}"));
                if !message.is_empty() {
                    lines.push(format!("{}{}", indent(1), message));
                }
            }
            None => lines.push(format!("{header} ✗ {}", ErrorKind::InternalError)),
        }
    }

    let summary = summarize(result);
    lines.push(String::new());
    lines.push(format!(
        "Converted {} of {} file{}, {} uploaded",
        summary.succeeded,
        names.len(),
        plural(names.len()),
        format_kb(summary.bytes)
    ));
    lines
}

pub fn print_batch_report(names: &[String], result: &BatchResult) {
    for line in format_batch_report(names, result) {
        println!("{}", line);
    }
}
