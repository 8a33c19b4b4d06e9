//! Shared test utilities for the pixpress test suite.
//!
//! Provides deterministic in-memory image fixtures. Everything derives from
//! fixed pixel functions, so two fixtures with the same dimensions are
//! byte-identical — which is exactly what cache determinism assertions need.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, Rgb, RgbImage};

/// Deterministic RGB gradient test image.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

/// The gradient, JPEG-encoded in memory.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, 90))
        .unwrap();
    bytes
}

/// A solid-color PNG. Lossless, so every decoded pixel is exactly `rgb` —
/// use this when asserting on sampled colors.
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
    let mut bytes = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut bytes)).unwrap();
    bytes
}
