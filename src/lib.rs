//! # ampe-convert
//!
//! Batch image conversion: a caller uploads N images plus per-image
//! parameters (target format, width, height, fit policy, strip-metadata
//! flag); each image is decoded, resized, re-encoded, written to an object
//! store, and described in a response record. Records come back in upload
//! order and one bad file never sinks the rest of the batch.
//!
//! # Architecture: Bind → Coordinate → Correlate
//!
//! ```text
//! 1. Bind        files + 5 parallel lists  →  Vec<ConversionRequest>   (all-or-nothing)
//! 2. Coordinate  requests  →  BatchResult    (convert on rayon, upload on tokio, per-file outcomes)
//! 3. Correlate   BatchResult  →  response records in upload order
//! ```
//!
//! Binding is the only whole-batch failure point. After it, every file owns
//! one slot in the result and failures are recorded there, never propagated.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`binder`] | Validates list alignment and size limits, produces per-file requests |
//! | [`batch`] | Runs conversion + upload per file under CPU, memory and upload bounds |
//! | [`correlate`] | Maps outcomes to response records by input position |
//! | [`imaging`] | Pure-Rust decode, resize, encode and metadata handling |
//! | [`storage`] | `ObjectStore` trait with S3, local-directory and in-memory backends |
//! | [`server`] | axum HTTP surface: multipart decoding, CORS, deadlines |
//! | [`config`] | `config.toml` loading, merging over defaults, env overrides, validation |
//! | [`naming`] | Output key derivation (`stem.format`) |
//! | [`types`] | Shared request/outcome types |
//! | [`output`] | CLI report formatting for `convert` |
//! | [`telemetry`] | `tracing` subscriber setup |
//!
//! # Design Decisions
//!
//! ## Two Pools, Two Bounds
//!
//! Decoding and encoding are CPU-bound and run on a dedicated rayon pool
//! sized to the core count. Uploads are I/O-bound and stay on tokio, capped
//! by a separate semaphore. A third bound limits how many files may sit
//! between "conversion started" and "upload finished", so a 50-file batch of
//! large images does not hold 50 decoded bitmaps at once.
//!
//! ## Positional Correlation
//!
//! Uploads are matched to results by index. Two files named `photo.jpg`
//! produce two records, each with its own outcome. They do share the output
//! key `photo.<format>`; the store keeps whichever write lands last.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling) and
//! its rav1e-backed AVIF encoder. No ImageMagick, no libvips, no system
//! libraries to install.
//!
//! ## Counted Bytes
//!
//! Reported sizes come from the byte count the store backend itself
//! observed while writing, and the uploader refuses a count that differs
//! from the encoded length.

pub mod batch;
pub mod binder;
pub mod config;
pub mod correlate;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
