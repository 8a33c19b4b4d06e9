//! # Pixpress
//!
//! An on-demand image derivative service. Originals live wherever a
//! [`source::AssetProvider`] can reach them; every served variant (resized,
//! cropped, re-encoded, blurred) is produced on first request and answered
//! from a disk cache on every request after.
//!
//! # Architecture: One Request, Five Steps
//!
//! Every request runs the same short pipeline inside
//! [`service::ImageService::handle`]:
//!
//! ```text
//! 1. Normalize   src param      →  provider-local path  (unwrap proxied URLs)
//! 2. Negotiate   Accept header  →  output format        (avif > webp > jpeg)
//! 3. Key         path + params  →  cache key + ETag     (deterministic hash)
//! 4. Cache       key            →  hit / stale / miss   (mtime freshness)
//! 5. Transform   source bytes   →  derivative bytes     (decode → resize → encode)
//! ```
//!
//! Steps 1-4 are cheap; step 5 only runs on a miss or a stale entry. The
//! service is transport-agnostic: [`request`] defines the plain request and
//! response values, and whatever HTTP layer hosts the service maps them to
//! the wire.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`service`] | Request orchestration: normalize, negotiate, cache check, transform, respond |
//! | [`request`] | Transport-agnostic request parsing and response assembly |
//! | [`transform`] | The pixel pipeline: decode → resize/crop → blur/sharpen → encode |
//! | [`format`] | Output formats, per-format encoder settings, `Accept` negotiation |
//! | [`cache`] | Cache keys, the on-disk store, hit/stale/miss accounting |
//! | [`janitor`] | Age-based sweeping of the cache directory |
//! | [`source`] | Asset providers and source-string normalization |
//! | [`responsive`] | Parallel multi-width variant generation for `srcset` |
//! | [`placeholder`] | Blurred inline previews (LQIP) and dominant colors |
//! | [`config`] | `pixpress.toml` loading and validation |
//!
//! # Design Decisions
//!
//! ## Flat, Key-Named Cache
//!
//! The cache is a single directory of files named by their cache key. There
//! is no manifest, no index, no database: the filesystem *is* the lookup
//! structure, and freshness is decided by comparing the entry's mtime with
//! the source's. Writes go through a temp file renamed into place, so
//! concurrent requests for the same derivative need no locks — the worst
//! case is redundant work producing identical bytes.
//!
//! ## ETags From Keys, Not Bytes
//!
//! The ETag is derived from the cache key (source path + parameters), not
//! from the derivative's bytes. That makes conditional requests free — no
//! file read to answer a 304 — at the cost that an edited source keeps the
//! same ETag. The mtime freshness check covers that: a stale entry is never
//! answered with 304, it is regenerated and served in full.
//!
//! ## Pure-Rust Imaging (No ImageMagick, No libvips)
//!
//! The [`transform`] pipeline uses the `image` crate for decoding and
//! geometry, `jpeg-encoder` for progressive JPEG, the `webp` crate for
//! lossy WebP, and `rav1e` (via `image`) for AVIF — all pure Rust. No
//! system dependencies, no shelling out, no version skew between machines.
//!
//! ## Modern Formats Behind Negotiation
//!
//! When a request doesn't pin a format, the `Accept` header picks the best
//! one the client advertises: AVIF, then WebP, then JPEG. Clients that send
//! nothing useful get JPEG, which everything renders. Explicit `f=` always
//! wins over negotiation.
//!
//! ## Placeholders Never Fail
//!
//! [`placeholder::generate`] returns a value, not a `Result`. A preview is
//! decoration: if the source is missing or broken, the page gets a neutral
//! gray stand-in and the real error surfaces on the full-size request, where
//! it can actually be acted on.

pub mod cache;
pub mod config;
pub mod format;
pub mod janitor;
pub mod placeholder;
pub mod request;
pub mod responsive;
pub mod service;
pub mod source;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;
