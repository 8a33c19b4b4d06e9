//! Derivative transform pipeline — pure Rust, no native libraries to install.
//!
//! | Step | Crate / function |
//! |---|---|
//! | **Decode** (JPEG, PNG, TIFF, WebP) | `image` crate, format sniffed from bytes |
//! | **Resize / crop** | Lanczos3 via [`geometry`] plans + `resize_exact`/`crop_imm` |
//! | **Blur / sharpen** | `image` `blur` + `unsharpen` |
//! | **Encode → JPEG** | `jpeg-encoder` (progressive) |
//! | **Encode → PNG** | `image` `PngEncoder` (best compression, adaptive filter) |
//! | **Encode → WebP** | `webp` crate (lossy, method 6) |
//! | **Encode → AVIF** | `image` `AvifEncoder` (rav1e, speed 1) |
//!
//! The module is split into:
//! - **Params**: Data structures describing a transform
//! - **Geometry**: Pure functions for dimension math (unit testable)
//! - **Encode**: Per-format byte production
//! - **Pipeline**: decode → resize/crop → blur → sharpen → encode

use thiserror::Error;

mod encode;
mod geometry;
mod params;
mod pipeline;

pub use encode::encode;
pub use geometry::{CropRect, ResizePlan, plan_resize};
pub use params::{Fit, Position, Quality, Sharpening, TransformConfig};
pub use pipeline::{decodable_input, decode, transform};

#[derive(Error, Debug)]
pub enum TransformError {
    /// The detected container format is not on the input whitelist.
    #[error("unsupported source format: {0}")]
    UnsupportedSource(String),
    /// Unreadable pixels: no recognizable container at all, or a decoder
    /// failure partway through the stream.
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}
