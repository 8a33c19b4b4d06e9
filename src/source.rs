//! Source asset access and source-string normalization.
//!
//! The [`AssetProvider`] trait is the seam between this service and wherever
//! originals live — the production implementation is [`FsProvider`] (a
//! directory on disk), tests use a recording mock. Everything upstream of
//! the provider works with normalized, provider-local paths produced by
//! [`normalize_source`].

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a source string could not be normalized.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    /// The string can never name a servable asset (bad scheme, traversal,
    /// foreign host, empty).
    #[error("invalid source: {0}")]
    Invalid(String),
    /// The string looks like a proxied URL but unwrapping it failed.
    #[error("could not unwrap proxied URL: {0}")]
    Unwrap(String),
}

/// Stat result for a source asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetMeta {
    pub mtime: SystemTime,
    pub len: u64,
}

/// Read access to original assets.
///
/// Implementations must be `Sync`: one provider is shared across all
/// concurrent requests.
pub trait AssetProvider: Sync {
    /// Fetch the asset's bytes.
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError>;

    /// Fetch the asset's modification time and size without reading it.
    fn stat(&self, path: &str) -> Result<AssetMeta, SourceError>;
}

/// Assets as files under a root directory.
pub struct FsProvider {
    root: PathBuf,
}

impl FsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a normalized source path to a file under the root. Anything that
    /// would escape the root does not exist as far as the provider is
    /// concerned.
    fn resolve(&self, path: &str) -> Result<PathBuf, SourceError> {
        let rel = Path::new(path.trim_start_matches('/'));
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SourceError::NotFound(path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl AssetProvider for FsProvider {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(path.to_string()),
            _ => SourceError::Io(e),
        })
    }

    fn stat(&self, path: &str) -> Result<AssetMeta, SourceError> {
        let full = self.resolve(path)?;
        let meta = std::fs::metadata(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(path.to_string()),
            _ => SourceError::Io(e),
        })?;
        Ok(AssetMeta {
            mtime: meta.modified()?,
            len: meta.len(),
        })
    }
}

/// Maximum number of proxied-URL layers [`normalize_source`] will unwrap.
const MAX_UNWRAP_DEPTH: usize = 4;

/// One peeled layer of a source string.
enum Layer {
    /// A provider-local path, ready for validation.
    Path(String),
    /// A proxied URL wrapping this inner source reference.
    Proxied(String),
}

/// Normalize a request's `src` value into a provider-local path.
///
/// Handles the self-referential case where the source string is itself a
/// URL of this service (`/img?src=%2Fphotos%2Fa.jpg&w=800`) — the embedded
/// `src` parameter is unwrapped, repeatedly if needed, up to
/// [`MAX_UNWRAP_DEPTH`] layers. The result always starts with `/`, so the
/// same asset hashes to the same cache key however the caller spelled it.
pub fn normalize_source(src: &str) -> Result<String, NormalizeError> {
    let mut current = src.trim().to_string();
    for _ in 0..=MAX_UNWRAP_DEPTH {
        match peel(&current)? {
            Layer::Path(path) => return finish(path),
            Layer::Proxied(inner) => current = inner,
        }
    }
    Err(NormalizeError::Unwrap(format!(
        "nested deeper than {MAX_UNWRAP_DEPTH} levels"
    )))
}

fn peel(s: &str) -> Result<Layer, NormalizeError> {
    if s.is_empty() {
        return Err(NormalizeError::Invalid("empty source".into()));
    }
    match url::Url::parse(s) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {
            // Absolute URLs are only meaningful when they wrap one of our
            // own sources; we never fetch from remote hosts.
            match embedded_src(u.query().unwrap_or("")) {
                Some(inner) => Ok(Layer::Proxied(inner)),
                None if u.query().is_some() => Err(NormalizeError::Unwrap(
                    "query carries no usable src parameter".into(),
                )),
                None => Err(NormalizeError::Invalid(
                    "remote URLs are not served".into(),
                )),
            }
        }
        Ok(u) => Err(NormalizeError::Invalid(format!(
            "unsupported scheme: {}",
            u.scheme()
        ))),
        Err(_) => match s.split_once('?') {
            Some((_, query)) => embedded_src(query).map(Layer::Proxied).ok_or_else(|| {
                NormalizeError::Unwrap("query carries no usable src parameter".into())
            }),
            None => Ok(Layer::Path(s.to_string())),
        },
    }
}

fn embedded_src(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "src")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn finish(path: String) -> Result<String, NormalizeError> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(NormalizeError::Invalid("path traversal".into()));
    }
    if path.starts_with('/') {
        Ok(path)
    } else {
        Ok(format!("/{path}"))
    }
}
