//! Output format registry and content negotiation.
//!
//! Every format the service can emit is described here: its MIME type, file
//! extension, default encoding quality, and the encoder settings it is
//! produced with. The rest of the codebase never branches on format strings —
//! it goes through [`OutputFormat`] and [`EncodeOpts`].
//!
//! | Format | MIME | Default quality | Encoder settings |
//! |---|---|---|---|
//! | JPEG | `image/jpeg` | 85 | progressive, optimized Huffman tables |
//! | PNG  | `image/png`  | 90 | best compression, adaptive filtering |
//! | WebP | `image/webp` | 80 | lossy, method 6 (slowest/best) |
//! | AVIF | `image/avif` | 75 | rav1e speed 1 (slowest/best) |

use crate::transform::Quality;

/// An image format the service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    /// MIME type for the `Content-Type` response header.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Canonical file extension (no dot), used for cache entry filenames.
    pub fn ext(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// Quality used when a request doesn't specify one.
    pub fn default_quality(self) -> Quality {
        match self {
            Self::Jpeg => Quality::new(85),
            Self::Png => Quality::new(90),
            Self::Webp => Quality::new(80),
            Self::Avif => Quality::new(75),
        }
    }

    /// Parse a format name as it appears in the `f` request parameter or a
    /// file extension. Case-insensitive; `jpg` and `jpeg` are synonyms.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Stable discriminant fed into cache key hashing. Append-only.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Jpeg => 0,
            Self::Png => 1,
            Self::Webp => 2,
            Self::Avif => 3,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ext())
    }
}

/// Encoder settings, one variant per format.
///
/// New formats add a variant here and an arm in
/// [`encode`](crate::transform::encode); nothing else changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOpts {
    /// Progressive JPEG with optimized Huffman tables.
    Jpeg { quality: Quality },
    /// Lossless; best compression with adaptive filtering. The requested
    /// quality doesn't reach the encoder but still participates in cache
    /// keying.
    Png,
    /// Lossy WebP, method 6.
    Webp { quality: Quality },
    /// AVIF via rav1e at speed 1.
    Avif { quality: Quality },
}

impl EncodeOpts {
    /// Resolve encoder settings for a format, falling back to the format's
    /// default quality when the request didn't pin one.
    pub fn resolve(format: OutputFormat, quality: Option<Quality>) -> Self {
        let q = quality.unwrap_or_else(|| format.default_quality());
        match format {
            OutputFormat::Jpeg => Self::Jpeg { quality: q },
            OutputFormat::Png => Self::Png,
            OutputFormat::Webp => Self::Webp { quality: q },
            OutputFormat::Avif => Self::Avif { quality: q },
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            Self::Jpeg { .. } => OutputFormat::Jpeg,
            Self::Png => OutputFormat::Png,
            Self::Webp { .. } => OutputFormat::Webp,
            Self::Avif { .. } => OutputFormat::Avif,
        }
    }
}

/// Choose an output format from an `Accept` header.
///
/// Preference order when the header is present: AVIF, then WebP, then JPEG.
/// An absent or unrecognized header falls back to JPEG, which every client
/// renders. Matching is a substring check on the media type — quality
/// parameters (`;q=`) are ignored, which is fine for the three formats we
/// distinguish.
pub fn negotiate(accept: Option<&str>) -> OutputFormat {
    let Some(header) = accept else {
        return OutputFormat::Jpeg;
    };
    if header.contains("image/avif") {
        OutputFormat::Avif
    } else if header.contains("image/webp") {
        OutputFormat::Webp
    } else {
        OutputFormat::Jpeg
    }
}
