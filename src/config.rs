//! Service configuration module.
//!
//! Handles loading and validating the `pixpress.toml` config file. One flat
//! file configures the whole service; there is no layering or per-directory
//! override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source_root = "assets"       # Directory source images are served from
//!
//! [cache]
//! dir = ".pixpress-cache"      # Where finished derivatives are stored
//! max_age_days = 7             # Janitor: sweep entries older than this
//! client_max_age = 31536000    # Cache-Control max-age on responses, seconds
//!
//! [limits]
//! max_dimension = 4096         # Largest accepted w/h request value
//! input_formats = ["jpg", "jpeg", "png", "tif", "tiff", "webp"]
//!
//! [variants]
//! widths = [320, 640, 960, 1280, 1920]  # Responsive srcset widths
//!
//! [placeholder]
//! width = 20                   # Pixel width of blur-up placeholder images
//!
//! [processing]
//! max_threads = 4              # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse — override just the values you want:
//!
//! ```toml
//! # Only raise the dimension cap
//! [limits]
//! max_dimension = 8192
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use image::ImageFormat;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::transform::decodable_input;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `pixpress.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory source images are resolved against.
    #[serde(default = "default_source_root")]
    pub source_root: String,
    /// Derivative cache settings.
    pub cache: CacheConfig,
    /// Request limits and the accepted input formats.
    pub limits: LimitsConfig,
    /// Responsive variant generation settings.
    pub variants: VariantsConfig,
    /// Blur-up placeholder settings.
    pub placeholder: PlaceholderConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

fn default_source_root() -> String {
    "assets".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            cache: CacheConfig::default(),
            limits: LimitsConfig::default(),
            variants: VariantsConfig::default(),
            placeholder: PlaceholderConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "limits.max_dimension must be at least 1".into(),
            ));
        }
        if self.limits.input_formats.is_empty() {
            return Err(ConfigError::Validation(
                "limits.input_formats must not be empty".into(),
            ));
        }
        for ext in &self.limits.input_formats {
            if decodable_input(ext).is_none() {
                return Err(ConfigError::Validation(format!(
                    "limits.input_formats: '{ext}' is not a decodable format"
                )));
            }
        }
        if self.variants.widths.is_empty() {
            return Err(ConfigError::Validation(
                "variants.widths must not be empty".into(),
            ));
        }
        if self
            .variants
            .widths
            .iter()
            .any(|&w| w == 0 || w > self.limits.max_dimension)
        {
            return Err(ConfigError::Validation(format!(
                "variants.widths values must be between 1 and {}",
                self.limits.max_dimension
            )));
        }
        if self.placeholder.width == 0 {
            return Err(ConfigError::Validation(
                "placeholder.width must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Age at which the janitor removes cache entries.
    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.cache.max_age_days * 86_400)
    }

    /// Detected container formats accepted for decoding, deduplicated
    /// (`jpg` and `jpeg` name the same container). [`validate`] has already
    /// established that every configured name maps to a format.
    ///
    /// [`validate`]: ServiceConfig::validate
    pub fn allowed_input_formats(&self) -> Vec<ImageFormat> {
        let mut formats = Vec::new();
        for ext in &self.limits.input_formats {
            if let Some(format) = decodable_input(ext)
                && !formats.contains(&format)
            {
                formats.push(format);
            }
        }
        formats
    }
}

/// Derivative cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory finished derivatives are stored in. Created on startup if
    /// missing.
    pub dir: String,
    /// Janitor cutoff: entries whose mtime is older than this many days are
    /// removed by `sweep`.
    pub max_age_days: u64,
    /// `max-age` sent in the `Cache-Control` header of every derivative
    /// response, in seconds.
    pub client_max_age: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: ".pixpress-cache".to_string(),
            max_age_days: 7,
            client_max_age: 31_536_000,
        }
    }
}

/// Request limits and accepted input formats.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted `w` or `h` request value. Requests above this are
    /// rejected, not clamped.
    pub max_dimension: u32,
    /// Extensions naming the source containers the service will decode.
    /// The check at decode time is on the detected container, not the
    /// file's extension.
    pub input_formats: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: 4096,
            input_formats: ["jpg", "jpeg", "png", "tif", "tiff", "webp"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Responsive variant generation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantsConfig {
    /// Pixel widths to generate for responsive `srcset` attributes.
    pub widths: Vec<u32>,
}

impl Default for VariantsConfig {
    fn default() -> Self {
        Self {
            widths: vec![320, 640, 960, 1280, 1920],
        }
    }
}

/// Blur-up placeholder settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaceholderConfig {
    /// Pixel width of the inlined placeholder image.
    pub width: u32,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self { width: 20 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transform workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Load config from the given file path.
///
/// A missing file means stock defaults. An existing file is parsed with
/// unknown keys rejected, then validated.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        ServiceConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `pixpress.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixpress Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory source images are resolved against. Request paths like
# /photos/dawn.jpg resolve to <source_root>/photos/dawn.jpg.
source_root = "assets"

# ---------------------------------------------------------------------------
# Derivative cache
# ---------------------------------------------------------------------------
[cache]
# Where finished derivatives are stored. Created on startup if missing.
dir = ".pixpress-cache"

# The sweep command removes entries older than this many days.
max_age_days = 7

# max-age sent in the Cache-Control header of every derivative response,
# in seconds. The default is one year; entries are keyed by content and
# parameters, so long client caching is safe.
client_max_age = 31536000

# ---------------------------------------------------------------------------
# Request limits
# ---------------------------------------------------------------------------
[limits]
# Largest accepted w or h request value. Bigger requests are rejected.
max_dimension = 4096

# Source containers the service will decode. The check is on the detected
# container format, not the file's extension.
input_formats = ["jpg", "jpeg", "png", "tif", "tiff", "webp"]

# ---------------------------------------------------------------------------
# Responsive variants
# ---------------------------------------------------------------------------
[variants]
# Pixel widths generated for responsive srcset attributes.
widths = [320, 640, 960, 1280, 1920]

# ---------------------------------------------------------------------------
# Placeholders
# ---------------------------------------------------------------------------
[placeholder]
# Pixel width of the inlined blur-up placeholder image.
width = 20

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel transform workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4
"##
}
