//! Disk cache for finished derivatives.
//!
//! Every successfully encoded derivative is written here, so the next request
//! for the same source and parameters is a file read instead of a decode,
//! resize, and encode round.
//!
//! # Design
//!
//! ## Cache keys
//!
//! An entry is identified by a [`CacheKey`]: a short hash of the normalized
//! source path plus a short hash of every output-affecting transform
//! parameter. The parameter hash feeds fields to SHA-256 in one fixed order
//! with presence bytes for optional values, so two requests spelling the same
//! transform differently (parameter order, repeated keys) land on the same
//! entry, and a change to any single parameter lands on a different one.
//!
//! Keys render as `<source>-<params>` in lowercase hex, which is a safe
//! filename on every filesystem the cache can live on. Changing the hash
//! layout changes every key; old entries are simply orphaned and collected
//! by the janitor.
//!
//! ## Freshness
//!
//! There is no manifest. The entry file's own mtime records when it was
//! written, and [`is_valid`] compares that against the source's mtime: an
//! entry written before the source last changed is stale and gets
//! regenerated on the next request.
//!
//! ## Failure posture
//!
//! The cache is an accelerator, never a gatekeeper. Reads that fail for any
//! reason count as misses. Writes that fail are reported to the caller, who
//! logs and serves the derivative from memory anyway. Writes go to a
//! temporary file inside the cache root and are renamed into place, so a
//! concurrent reader never observes a partially written entry; two writers
//! racing on one key produce identical bytes, and the last rename wins.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::format::OutputFormat;
use crate::transform::TransformConfig;

/// Hex characters kept from the source-path hash (48 bits).
const SOURCE_HASH_CHARS: usize = 12;

/// Hex characters kept from the parameter hash (64 bits). Together with the
/// source hash this is far beyond what a cache directory can collide on.
const PARAMS_HASH_CHARS: usize = 16;

/// Identity of one derivative: normalized source path + transform parameters.
///
/// Construction is pure and deterministic. Two keys compare equal exactly
/// when they would name the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    params: String,
}

impl CacheKey {
    pub fn new(source_path: &str, config: &TransformConfig) -> Self {
        Self {
            source: hash_source_path(source_path),
            params: hash_transform_params(config),
        }
    }

    /// Strong ETag for responses serving this derivative.
    pub fn etag(&self) -> String {
        format!("\"{self}\"")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.params)
    }
}

/// SHA-256 of the normalized source path, truncated to a short hex prefix.
fn hash_source_path(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"source\0");
    hasher.update(path.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(SOURCE_HASH_CHARS);
    hex
}

/// SHA-256 of every output-affecting transform parameter.
///
/// Fields are hashed in one fixed order regardless of how the request
/// spelled them. Optional fields contribute a presence byte before their
/// value, so `None` can never alias a legitimate value.
fn hash_transform_params(config: &TransformConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"transform\0");
    match config.width {
        Some(w) => {
            hasher.update(b"\x01");
            hasher.update(w.to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    match config.height {
        Some(h) => {
            hasher.update(b"\x01");
            hasher.update(h.to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update([config.format.tag()]);
    match config.quality {
        Some(q) => {
            hasher.update(b"\x01");
            hasher.update(q.value().to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update([config.fit.tag()]);
    hasher.update([config.position.tag()]);
    match config.blur {
        Some(sigma) => {
            hasher.update(b"\x01");
            hasher.update(sigma.to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update([config.sharpen as u8]);
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(PARAMS_HASH_CHARS);
    hex
}

/// An entry lives at `<root>/<key>.<ext>`; freshness rides on the file's
/// mtime. See the module docs for the full design.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

/// A derivative read back from disk.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub bytes: Vec<u8>,
    /// When the entry was written (the file's mtime). Compare against the
    /// source's mtime with [`is_valid`] before serving.
    pub stored_at: SystemTime,
}

impl CacheStore {
    /// Open a cache rooted at `root`, creating the directory if needed.
    /// Opening an existing root is fine and changes nothing.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where an entry for `key` in `format` lives on disk.
    pub fn entry_path(&self, key: &CacheKey, format: OutputFormat) -> PathBuf {
        self.root.join(format!("{key}.{}", format.ext()))
    }

    /// Look up a cached derivative. Anything that prevents reading the
    /// entry — missing file, permission problem, unreadable metadata — is
    /// a miss, never an error.
    pub fn get(&self, key: &CacheKey, format: OutputFormat) -> Option<CachedEntry> {
        let path = self.entry_path(key, format);
        let stored_at = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("cache stat failed for {}: {e}", path.display());
                }
                return None;
            }
        };
        match fs::read(&path) {
            Ok(bytes) => Some(CachedEntry { bytes, stored_at }),
            Err(e) => {
                debug!("cache read failed for {}: {e}", path.display());
                None
            }
        }
    }

    /// Persist a derivative atomically: write to a temp file in the cache
    /// root, then rename over the final name.
    pub fn put(&self, key: &CacheKey, format: OutputFormat, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.persist(self.entry_path(key, format))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

/// Whether a cached entry may be served for a source last modified at
/// `source_mtime`. Only an entry written strictly after the source changed
/// is valid; equal timestamps count as stale, because a write in the same
/// clock tick as a source edit may predate it.
pub fn is_valid(stored_at: SystemTime, source_mtime: SystemTime) -> bool {
    stored_at > source_mtime
}

/// How one lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Fresh entry served straight from disk.
    Hit,
    /// An entry existed but predated the source's last modification.
    Stale,
    /// No entry; the derivative was produced on demand.
    Miss,
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hit => "cached",
            Self::Stale => "refreshed",
            Self::Miss => "transformed",
        };
        write!(f, "{label}")
    }
}

/// Summary of cache performance across a batch of lookups.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u32,
    pub stale: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn record(&mut self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.hits += 1,
            CacheOutcome::Stale => self.stale += 1,
            CacheOutcome::Miss => self.misses += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.hits + self.stale + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.stale > 0 {
            if self.stale > 0 {
                write!(
                    f,
                    "{} cached, {} refreshed, {} transformed ({} total)",
                    self.hits,
                    self.stale,
                    self.misses,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} transformed ({} total)",
                    self.hits,
                    self.misses,
                    self.total()
                )
            }
        } else {
            write!(f, "{} transformed", self.misses)
        }
    }
}
