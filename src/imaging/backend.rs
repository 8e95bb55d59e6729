//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the single seam between the batch pipeline
//! and pixel work: bytes in, encoded bytes out. Backends are synchronous and
//! CPU-bound; the coordinator runs them on a dedicated rayon pool.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! [`MockBackend`](tests::MockBackend) below.

use super::params::{ConvertParams, OutputFormat};
use crate::types::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Source bytes are not a decodable image.
    #[error("cannot decode source image: {0}")]
    UnsupportedSource(String),
    /// Requested target format is unknown or disabled.
    #[error("unsupported target format: {0}")]
    UnsupportedTarget(String),
    #[error("conversion failed: {0}")]
    Internal(String),
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
            Self::UnsupportedTarget(_) => ErrorKind::UnsupportedTarget,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// An encoded image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub dimensions: Dimensions,
}

impl Converted {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Trait for image processing backends.
///
/// `Send + Sync` so one instance can be shared across the worker pool.
pub trait ImageBackend: Send + Sync {
    /// Decode `source`, apply resize/fit, re-encode to `params.format`.
    fn convert(&self, source: &[u8], params: &ConvertParams) -> Result<Converted, ConvertError>;
}
