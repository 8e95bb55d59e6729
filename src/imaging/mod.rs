//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` with content sniffing |
//! | **Resize / fit** | Lanczos3 + crop / pad per [`Fit`](crate::types::Fit) |
//! | **Encode** | JPEG, PNG, WebP, AVIF (rav1e), GIF |
//! | **Metadata** | ICC and EXIF read from the decoder, handed to the encoder |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a conversion
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining parameters + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{ConvertError, Converted, Dimensions, ImageBackend};
pub use calculations::{ResizePlan, plan_resize};
pub use operations::{convert_image, resolve_format};
pub use params::{ConvertParams, EncodeSettings, OutputFormat, Quality};
pub use rust_backend::RustBackend;
