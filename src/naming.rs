//! Output key derivation from uploaded filenames.
//!
//! Every converted object is stored under `stem + "." + format`, where the
//! stem is the filename portion before its *first* dot:
//!
//! - `photo.jpg` + `webp` → `photo.webp`
//! - `holiday.2024.png` + `avif` → `holiday.avif`
//! - `C:\Users\me\scan.tiff` + `png` → `scan.png` (client path components dropped)
//!
//! Two uploads that share a stem and target format map to the same key; the
//! store keeps whichever write lands last.

/// Fallback stem when a filename has nothing before its first dot.
const DEFAULT_STEM: &str = "image";

/// Strip any directory components a client may have sent along with the name.
pub fn base_name(original_name: &str) -> &str {
    original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name)
}

/// Filename portion preceding its first extension separator.
///
/// Returns [`DEFAULT_STEM`] when that portion is empty (`.hidden`, `""`).
pub fn stem(original_name: &str) -> &str {
    let base = base_name(original_name);
    let stem = base.split('.').next().unwrap_or(base).trim();
    if stem.is_empty() { DEFAULT_STEM } else { stem }
}

/// Object key for a converted file.
pub fn output_key(original_name: &str, target_format: &str) -> String {
    format!("{}.{}", stem(original_name), target_format)
}
