//! Blurred inline placeholders (LQIP).
//!
//! A placeholder is a tiny blurred rendition of the source inlined as a
//! `data:` URL, paired with the image's dominant color for a layout
//! background while the real derivative loads. Generation never fails:
//! whatever goes wrong upstream (missing source, undecodable bytes), the
//! caller gets a neutral-gray stand-in instead of an error. A broken
//! preview must not block a page render.

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::debug;

use crate::format::EncodeOpts;
use crate::service::{ImageService, ServeError, source_err};
use crate::source::{AssetProvider, normalize_source};
use crate::transform::{Fit, Position, Quality, decode, encode, plan_resize};

/// Placeholders trade fidelity for byte count: low quality and a blur that
/// is heavy relative to their few pixels.
const LQIP_QUALITY: u32 = 25;
const LQIP_BLUR_SIGMA: f32 = 1.0;

/// Served when the source cannot be previewed.
pub const FALLBACK_COLOR: &str = "#808080";
const FALLBACK_DATA_URL: &str = "data:image/svg+xml,%3Csvg%20xmlns='http://www.w3.org/2000/svg'%20width='20'%20height='20'%3E%3Crect%20width='20'%20height='20'%20fill='%23808080'/%3E%3C/svg%3E";

/// An inlineable preview of one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// `data:image/jpeg;base64,...`, ready for a `src` attribute or a
    /// `background-image`.
    pub data_url: String,
    /// `#rrggbb` average color of the whole image.
    pub dominant_color: String,
}

impl Placeholder {
    fn fallback() -> Self {
        Self {
            data_url: FALLBACK_DATA_URL.to_string(),
            dominant_color: FALLBACK_COLOR.to_string(),
        }
    }
}

/// Build the placeholder for `src` at the given pixel width.
///
/// Infallible by contract: failures are logged at debug level and degrade
/// to a flat [`FALLBACK_COLOR`] stand-in.
pub fn generate<P: AssetProvider>(service: &ImageService<P>, src: &str, width: u32) -> Placeholder {
    match try_generate(service, src, width) {
        Ok(placeholder) => placeholder,
        Err(err) => {
            debug!("placeholder for {src} fell back to static gray: {err}");
            Placeholder::fallback()
        }
    }
}

fn try_generate<P: AssetProvider>(
    service: &ImageService<P>,
    src: &str,
    width: u32,
) -> Result<Placeholder, ServeError> {
    let path = normalize_source(src)?;
    let bytes = service
        .provider()
        .read(&path)
        .map_err(|e| source_err(&path, e))?;
    let img = decode(&bytes, service.allowed_inputs())?;

    let dominant_color = dominant_color(&img);
    let preview = downscale(img, width).blur(LQIP_BLUR_SIGMA);
    let jpeg = encode(
        &preview,
        &EncodeOpts::Jpeg {
            quality: Quality::new(LQIP_QUALITY),
        },
    )?;

    Ok(Placeholder {
        data_url: format!("data:image/jpeg;base64,{}", base64_encode(&jpeg)),
        dominant_color,
    })
}

/// Average the whole image down to one pixel.
fn dominant_color(img: &DynamicImage) -> String {
    let px = img.resize_exact(1, 1, FilterType::Triangle).to_rgb8();
    let image::Rgb([r, g, b]) = *px.get_pixel(0, 0);
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Scale to the placeholder width, never upscaling. Triangle filtering is
/// plenty at these sizes and much cheaper than the main pipeline's Lanczos.
fn downscale(img: DynamicImage, width: u32) -> DynamicImage {
    let source = (img.width(), img.height());
    match plan_resize(source, Some(width), None, Fit::default(), Position::default()) {
        Some(plan) if plan.resize_to != source => {
            img.resize_exact(plan.resize_to.0, plan.resize_to.1, FilterType::Triangle)
        }
        _ => img,
    }
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard base64 with padding. Hand-rolled to avoid a base64 crate
/// dependency for this one call site.
fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let n = (u32::from(chunk[0]) << 16)
            | (u32::from(chunk.get(1).copied().unwrap_or(0)) << 8)
            | u32::from(chunk.get(2).copied().unwrap_or(0));
        out.push(BASE64_ALPHABET[((n >> 18) & 0x3f) as usize] as char);
        out.push(BASE64_ALPHABET[((n >> 12) & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 {
            BASE64_ALPHABET[((n >> 6) & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            BASE64_ALPHABET[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}
