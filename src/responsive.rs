//! Responsive variant fan-out.
//!
//! One source, many widths: produces the set of derivatives a responsive
//! `<img srcset>` needs. Every width is an independent request through the
//! full serving path — same keys, same cache entries a later live request
//! would hit — fanned out across the rayon pool. Variant URLs are built
//! from `(src, w, f, q)` with a fixed parameter order, so the URL for a
//! given variant is always the same string and re-requesting it reproduces
//! the same derivative.

use rayon::prelude::*;

use crate::cache::CacheStats;
use crate::format::OutputFormat;
use crate::request::ImageRequest;
use crate::service::{ImageService, ServeError};
use crate::source::AssetProvider;
use crate::transform::Quality;

/// Path prefix baked into variant URLs. The unwrapper accepts any path, so
/// this is presentation only.
const VARIANT_PATH: &str = "/img";

/// One generated width.
#[derive(Debug, Clone)]
pub struct Variant {
    pub width: u32,
    /// The URL a client would fetch this variant at.
    pub url: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// All variants for one source, in the caller's width order.
#[derive(Debug)]
pub struct VariantSet {
    pub variants: Vec<Variant>,
    pub stats: CacheStats,
}

impl VariantSet {
    /// The `srcset` attribute value for these variants.
    pub fn srcset(&self) -> String {
        self.variants
            .iter()
            .map(|v| format!("{} {}w", v.url, v.width))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Deterministic URL for one variant: parameters always appear in the same
/// order, values percent-encoded.
pub fn variant_url(src: &str, width: u32, format: OutputFormat, quality: Option<Quality>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("src", src);
    query.append_pair("w", &width.to_string());
    query.append_pair("f", format.ext());
    if let Some(q) = quality {
        query.append_pair("q", &q.value().to_string());
    }
    format!("{VARIANT_PATH}?{}", query.finish())
}

/// Generate a derivative for every width, in parallel.
///
/// Output order matches the input width order regardless of which worker
/// finishes first. The first error aborts the set — variant failures are
/// source-level problems (missing, undecodable) that would hit every width
/// the same way.
pub fn generate_variants<P: AssetProvider>(
    service: &ImageService<P>,
    src: &str,
    widths: &[u32],
    format: OutputFormat,
    quality: Option<Quality>,
) -> Result<VariantSet, ServeError> {
    let responses = widths
        .par_iter()
        .map(|&width| {
            let mut request = ImageRequest::new(src).with_width(width).with_format(format);
            request.quality = quality;
            service.handle(&request).map(|response| (width, response))
        })
        .collect::<Result<Vec<_>, ServeError>>()?;

    let mut stats = CacheStats::default();
    let variants = responses
        .into_iter()
        .map(|(width, response)| {
            stats.record(response.cache);
            Variant {
                width,
                url: variant_url(src, width, format, quality),
                content_type: response.content_type,
                body: response.body,
            }
        })
        .collect();

    Ok(VariantSet { variants, stats })
}
