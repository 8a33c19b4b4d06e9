//! Per-format byte production.
//!
//! Each encoder writes into an in-memory buffer; bytes only reach disk
//! through the cache store's atomic write path. Settings per format live in
//! [`EncodeOpts`] — see the table in [`format`](crate::format).

use super::TransformError;
use super::params::Quality;
use crate::format::EncodeOpts;
use image::DynamicImage;

/// Encode an image with the given per-format settings.
pub fn encode(img: &DynamicImage, opts: &EncodeOpts) -> Result<Vec<u8>, TransformError> {
    match *opts {
        EncodeOpts::Jpeg { quality } => encode_jpeg(img, quality),
        EncodeOpts::Png => encode_png(img),
        EncodeOpts::Webp { quality } => encode_webp(img, quality),
        EncodeOpts::Avif { quality } => encode_avif(img, quality),
    }
}

/// Progressive JPEG with optimized Huffman tables.
fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, TransformError> {
    let rgb = img.to_rgb8();
    // JPEG dimensions are 16-bit in the format itself
    let width = u16::try_from(rgb.width())
        .map_err(|_| TransformError::Encode("width exceeds JPEG's 65535 limit".into()))?;
    let height = u16::try_from(rgb.height())
        .map_err(|_| TransformError::Encode("height exceeds JPEG's 65535 limit".into()))?;

    let mut out = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut out, quality.value() as u8);
    encoder.set_progressive(true);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| TransformError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

/// PNG at the best compression level with adaptive filtering.
fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, TransformError> {
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| TransformError::Encode(format!("PNG encode failed: {e}")))?;
    Ok(out)
}

/// Lossy WebP at method 6 (slowest, best compression).
fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, TransformError> {
    // webp::Encoder only understands 8-bit RGB/RGBA buffers
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let encoder = webp::Encoder::from_image(img)
        .map_err(|e| TransformError::Encode(format!("WebP encode failed: {e}")))?;
    let mut config = webp::WebPConfig::new()
        .map_err(|_| TransformError::Encode("WebP config init failed".into()))?;
    config.quality = quality.value() as f32;
    config.method = 6;
    let mem = encoder
        .encode_advanced(&config)
        .map_err(|e| TransformError::Encode(format!("WebP encode failed: {e:?}")))?;
    Ok(mem.to_vec())
}

/// AVIF via rav1e at speed 1 (slowest, best compression).
fn encode_avif(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut out, 1, quality.value() as u8);
    img.write_with_encoder(encoder)
        .map_err(|e| TransformError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn jpeg_output_is_progressive() {
        let img = gradient(64, 48);
        let bytes = encode(
            &img,
            &EncodeOpts::Jpeg {
                quality: Quality::new(85),
            },
        )
        .unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "missing JPEG SOI marker");
        // Progressive JPEGs carry an SOF2 frame header instead of SOF0
        assert!(
            bytes.windows(2).any(|w| w == [0xFF, 0xC2]),
            "expected progressive SOF2 marker"
        );
    }

    #[test]
    fn png_output_has_signature() {
        let img = gradient(32, 32);
        let bytes = encode(&img, &EncodeOpts::Png).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn webp_output_has_riff_header() {
        let img = gradient(64, 48);
        let bytes = encode(
            &img,
            &EncodeOpts::Webp {
                quality: Quality::new(80),
            },
        )
        .unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn webp_accepts_non_rgb_input() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(16, 16, image::Luma([99])));
        let bytes = encode(
            &gray,
            &EncodeOpts::Webp {
                quality: Quality::new(80),
            },
        )
        .unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
    }

    #[test]
    fn avif_output_has_ftyp_box() {
        let img = gradient(32, 24);
        let bytes = encode(
            &img,
            &EncodeOpts::Avif {
                quality: Quality::new(75),
            },
        )
        .unwrap();
        assert_eq!(&bytes[4..12], b"ftypavif");
    }

    #[test]
    fn encoding_is_deterministic() {
        let img = gradient(64, 48);
        let opts = EncodeOpts::Webp {
            quality: Quality::new(80),
        };
        assert_eq!(encode(&img, &opts).unwrap(), encode(&img, &opts).unwrap());
    }

    #[test]
    fn quality_changes_output_bytes() {
        let img = gradient(64, 48);
        let a = encode(
            &img,
            &EncodeOpts::Webp {
                quality: Quality::new(40),
            },
        )
        .unwrap();
        let b = encode(
            &img,
            &EncodeOpts::Webp {
                quality: Quality::new(90),
            },
        )
        .unwrap();
        assert_ne!(a, b);
    }
}
