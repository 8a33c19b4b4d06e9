//! Parameter types for derivative transforms.
//!
//! A [`TransformConfig`] describes *what* derivative to produce, not *how* —
//! it is the value that, together with a source path, identifies a cached
//! derivative. Everything here is immutable and cheap to copy.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100). Clamped on construction.
//! - [`Fit`] — How to reconcile requested dimensions with the source aspect.
//! - [`Position`] — Which region survives a `cover` crop.
//! - [`Sharpening`] — Unsharp-mask parameters applied by the `sharpen` flag.
//! - [`TransformConfig`] — The full derivative description.

use crate::format::OutputFormat;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// How requested dimensions map onto the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fit {
    /// Fill the requested box completely, cropping overflow. The default.
    #[default]
    Cover,
    /// Fit entirely inside the requested box, possibly smaller on one axis.
    Contain,
    /// Match the requested box exactly, distorting aspect if needed.
    Fill,
}

impl Fit {
    /// Parse the `fit` request parameter. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cover" => Some(Self::Cover),
            "contain" => Some(Self::Contain),
            "fill" => Some(Self::Fill),
            _ => None,
        }
    }

    /// Stable discriminant fed into cache key hashing. Append-only.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Cover => 0,
            Self::Contain => 1,
            Self::Fill => 2,
        }
    }
}

/// Which region of the source survives a `cover` crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl Position {
    /// Parse the `position` request parameter. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "center" | "centre" => Some(Self::Center),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// Stable discriminant fed into cache key hashing. Append-only.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Center => 0,
            Self::Top => 1,
            Self::Bottom => 2,
            Self::Left => 3,
            Self::Right => 4,
        }
    }
}

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Light sharpening that restores edge crispness after downscaling.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            threshold: 0,
        }
    }
}

/// Full description of one derivative.
///
/// Width and height are both optional: neither set means re-encode only, one
/// set means aspect-preserving resize, both set means resize per [`Fit`].
/// `quality` of `None` resolves to the format's default at encode time but is
/// hashed as absent, so "no quality" and "explicit default quality" are
/// distinct cache entries — exactly mirroring what the encoder receives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: OutputFormat,
    pub quality: Option<Quality>,
    pub fit: Fit,
    pub position: Position,
    /// Gaussian blur radius, applied after resizing.
    pub blur: Option<f32>,
    /// Apply [`Sharpening::light`] after any blur.
    pub sharpen: bool,
}

impl TransformConfig {
    /// A bare re-encode to `format` with all other behavior defaulted.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            width: None,
            height: None,
            format,
            quality: None,
            fit: Fit::default(),
            position: Position::default(),
            blur: None,
            sharpen: false,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Quality the encoder will actually use.
    pub fn effective_quality(&self) -> Quality {
        self.quality.unwrap_or_else(|| self.format.default_quality())
    }
}
