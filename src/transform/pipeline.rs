//! The transform pipeline: decode → resize/crop → blur → sharpen → encode.
//!
//! Steps always run in that order. Decoding sniffs the real container format
//! from the bytes — the source's file extension is never trusted — and
//! rejects anything outside the caller's input whitelist before pixels are
//! touched.

use super::params::{Sharpening, TransformConfig};
use super::{TransformError, encode, geometry};
use crate::format::EncodeOpts;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is deliberately excluded: the `image` crate's `"avif"` feature only
/// enables the **encoder** (rav1e). Decoding would require `"avif-native"`,
/// a C library we don't link. This service emits AVIF but never ingests it.
const DECODABLE: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

/// Map a whitelist extension to its decodable format, if we can decode it.
pub fn decodable_input(ext: &str) -> Option<ImageFormat> {
    let ext = ext.to_ascii_lowercase();
    DECODABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, format)| *format)
}

/// Decode source bytes, enforcing the input whitelist on the *detected*
/// format. A `.jpg` file holding PNG bytes is treated as PNG.
pub fn decode(bytes: &[u8], allowed: &[ImageFormat]) -> Result<DynamicImage, TransformError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| TransformError::Decode(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| TransformError::Decode("unrecognized container".into()))?;
    if !allowed.contains(&format) {
        return Err(TransformError::UnsupportedSource(
            format.to_mime_type().to_string(),
        ));
    }
    reader
        .decode()
        .map_err(|e| TransformError::Decode(e.to_string()))
}

/// Run the full pipeline on source bytes, producing encoded derivative bytes.
pub fn transform(
    bytes: &[u8],
    config: &TransformConfig,
    allowed: &[ImageFormat],
) -> Result<Vec<u8>, TransformError> {
    let img = decode(bytes, allowed)?;
    let img = apply_geometry(img, config);
    let img = apply_effects(img, config);
    let opts = EncodeOpts::resolve(config.format, config.quality);
    encode(&img, &opts)
}

/// Resize and crop per the geometry plan. No plan means the source already
/// satisfies the request.
fn apply_geometry(img: DynamicImage, config: &TransformConfig) -> DynamicImage {
    let source = (img.width(), img.height());
    let Some(plan) = geometry::plan_resize(
        source,
        config.width,
        config.height,
        config.fit,
        config.position,
    ) else {
        return img;
    };

    let mut out = if plan.resize_to == source {
        img
    } else {
        img.resize_exact(plan.resize_to.0, plan.resize_to.1, FilterType::Lanczos3)
    };
    if let Some(crop) = plan.crop {
        out = out.crop_imm(crop.x, crop.y, crop.width, crop.height);
    }
    out
}

fn apply_effects(img: DynamicImage, config: &TransformConfig) -> DynamicImage {
    let mut out = img;
    if let Some(sigma) = config.blur {
        out = out.blur(sigma);
    }
    if config.sharpen {
        let s = Sharpening::light();
        out = out.unsharpen(s.sigma, s.threshold);
    }
    out
}
