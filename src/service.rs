//! Request orchestration: normalize, look up, transform, respond.
//!
//! [`ImageService`] owns the full serving path. One instance is shared
//! across all concurrent requests; it holds no locks and no mutable state.
//! Two requests racing on the same derivative at worst both compute it —
//! the pipeline is deterministic, the cache writes atomically, and the last
//! rename wins with identical bytes.
//!
//! The flow for one request:
//!
//! 1. normalize `src` into a provider-local path (unwrapping proxied URLs)
//! 2. stat the source — a missing source never touches the cache
//! 3. derive the [`CacheKey`] and look for a fresh entry
//! 4. fresh hit: serve it (or `304` if the client's ETag still matches)
//! 5. otherwise decode, transform, encode, write the cache entry, serve
//!
//! Cache trouble is recovered at every step: unreadable entries are misses,
//! failed writes are logged and the derivative is served from memory.

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheKey, CacheOutcome, CacheStore};
use crate::config::ServiceConfig;
use crate::request::{ImageRequest, ImageResponse, RequestError};
use crate::source::{AssetProvider, NormalizeError, SourceError, normalize_source};
use crate::transform::{self, TransformError};

/// Why a request could not be served.
///
/// Every kind carries its transport mapping: a stable machine-readable name
/// ([`kind`](ServeError::kind)) and an HTTP-shaped status
/// ([`status`](ServeError::status)).
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("invalid source: {0}")]
    InvalidSource(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    /// Cache reads and writes never surface this from [`ImageService`];
    /// it is recovered where it happens. The kind exists for hosts with
    /// their own cache plumbing.
    #[error("cache IO failed: {0}")]
    CacheIo(String),
    #[error("could not unwrap proxied URL: {0}")]
    Unwrap(String),
}

impl ServeError {
    /// Stable machine-readable error kind for response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidSource(_) => "invalid_source",
            Self::Decode(_) => "decode_error",
            Self::Encode(_) => "encode_error",
            Self::CacheIo(_) => "cache_io_error",
            Self::Unwrap(_) => "unwrap_error",
        }
    }

    /// Client errors for what the caller can fix, server errors for the rest.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidSource(_) | Self::Unwrap(_) => 400,
            Self::Decode(_) | Self::Encode(_) | Self::CacheIo(_) => 500,
        }
    }

    /// Render as a transport response. A missing source gets the SVG body
    /// so a broken `<img>` degrades visibly; everything else gets JSON.
    pub fn response(&self) -> ImageResponse {
        match self {
            Self::NotFound(_) => ImageResponse::not_found(),
            _ => ImageResponse::error_json(self.status(), self.kind(), &self.to_string()),
        }
    }
}

impl From<NormalizeError> for ServeError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::Invalid(msg) => Self::InvalidSource(msg),
            NormalizeError::Unwrap(msg) => Self::Unwrap(msg),
        }
    }
}

impl From<TransformError> for ServeError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::UnsupportedSource(msg) => Self::InvalidSource(msg),
            TransformError::Decode(msg) => Self::Decode(msg),
            TransformError::Encode(msg) => Self::Encode(msg),
        }
    }
}

impl From<RequestError> for ServeError {
    fn from(e: RequestError) -> Self {
        Self::InvalidSource(e.to_string())
    }
}

/// A provider failure is served as 404: either the asset is genuinely gone
/// or it is unreadable, and in both cases there is nothing to transform.
/// The underlying IO error still lands in the log.
pub(crate) fn source_err(path: &str, e: SourceError) -> ServeError {
    match e {
        SourceError::NotFound(p) => ServeError::NotFound(p),
        SourceError::Io(err) => {
            warn!("source access failed for {path}: {err}");
            ServeError::NotFound(path.to_string())
        }
    }
}

/// The derivative service. Construct once, share everywhere.
pub struct ImageService<P: AssetProvider> {
    provider: P,
    cache: CacheStore,
    allowed_inputs: Vec<ImageFormat>,
    max_dimension: u32,
    client_max_age: u64,
    placeholder_width: u32,
}

impl<P: AssetProvider> ImageService<P> {
    pub fn new(provider: P, cache: CacheStore, config: &ServiceConfig) -> Self {
        Self {
            provider,
            cache,
            allowed_inputs: config.allowed_input_formats(),
            max_dimension: config.limits.max_dimension,
            client_max_age: config.cache.client_max_age,
            placeholder_width: config.placeholder.width,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Dimension cap hosts should pass to [`ImageRequest::from_query`].
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Configured width for blur-up placeholders.
    pub fn placeholder_width(&self) -> u32 {
        self.placeholder_width
    }

    pub(crate) fn provider(&self) -> &P {
        &self.provider
    }

    pub(crate) fn allowed_inputs(&self) -> &[ImageFormat] {
        &self.allowed_inputs
    }

    /// Serve one request end to end.
    pub fn handle(&self, request: &ImageRequest) -> Result<ImageResponse, ServeError> {
        let path = normalize_source(&request.src)?;
        let config = request.transform_config();
        let meta = self
            .provider
            .stat(&path)
            .map_err(|e| source_err(&path, e))?;
        let key = CacheKey::new(&path, &config);
        let etag = key.etag();

        let mut outcome = CacheOutcome::Miss;
        if let Some(entry) = self.cache.get(&key, config.format) {
            if cache::is_valid(entry.stored_at, meta.mtime) {
                if request.matches_etag(&etag) {
                    debug!("{key} not modified");
                    return Ok(ImageResponse::not_modified(
                        config.format,
                        etag,
                        self.client_max_age,
                    ));
                }
                debug!("{key} served from cache");
                return Ok(ImageResponse::derivative(
                    entry.bytes,
                    config.format,
                    etag,
                    self.client_max_age,
                    CacheOutcome::Hit,
                ));
            }
            // Entry predates the source's last edit; rebuild it.
            outcome = CacheOutcome::Stale;
        }

        let source = self
            .provider
            .read(&path)
            .map_err(|e| source_err(&path, e))?;
        let body = transform::transform(&source, &config, &self.allowed_inputs)?;

        if let Err(e) = self.cache.put(&key, config.format, &body) {
            // Cache trouble must never fail the request.
            warn!("cache write failed for {key}: {e}");
        }

        debug!("{key} {outcome}: {} bytes", body.len());
        Ok(ImageResponse::derivative(
            body,
            config.format,
            etag,
            self.client_max_age,
            outcome,
        ))
    }

    /// Serve, mapping any failure to its transport response.
    pub fn respond(&self, request: &ImageRequest) -> ImageResponse {
        match self.handle(request) {
            Ok(response) => response,
            Err(err) => {
                if err.status() >= 500 {
                    warn!("request for {} failed: {err}", request.src);
                } else {
                    info!("request for {} rejected: {err}", request.src);
                }
                err.response()
            }
        }
    }

    /// Parse-and-serve convenience for hosts holding a raw query string.
    /// Total: malformed queries come back as error responses, not `Err`.
    pub fn serve_query(
        &self,
        query: &str,
        accept: Option<&str>,
        if_none_match: Option<&str>,
    ) -> ImageResponse {
        let mut request = match ImageRequest::from_query(query, self.max_dimension) {
            Ok(r) => r,
            Err(e) => {
                let err = ServeError::from(e);
                info!("malformed query rejected: {err}");
                return err.response();
            }
        };
        request.accept = accept.map(str::to_string);
        request.if_none_match = if_none_match.map(str::to_string);
        self.respond(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use crate::source::tests::{MockProvider, RecordedOp};
    use crate::test_helpers::jpeg_fixture;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn service_with(
        tmp: &TempDir,
        assets: &[(&str, Vec<u8>, SystemTime)],
    ) -> ImageService<MockProvider> {
        let provider = MockProvider::new();
        for (path, bytes, mtime) in assets {
            provider.insert(path, bytes.clone(), *mtime);
        }
        let cache = CacheStore::open(tmp.path().join("cache")).unwrap();
        ImageService::new(provider, cache, &ServiceConfig::default())
    }

    fn past() -> SystemTime {
        SystemTime::now() - Duration::from_secs(3_600)
    }

    // =========================================================================
    // Serving and caching
    // =========================================================================

    #[test]
    fn first_request_transforms_second_hits_cache() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(80, 60), past())]);
        let request = ImageRequest::new("/photos/a.jpg")
            .with_width(40)
            .with_format(OutputFormat::Webp);

        let first = service.handle(&request).unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.content_type, "image/webp");
        assert_eq!(first.cache, CacheOutcome::Miss);

        let second = service.handle(&request).unwrap();
        assert_eq!(second.cache, CacheOutcome::Hit);
        assert_eq!(second.body, first.body);

        // The source was read exactly once; the hit only needed a stat.
        let reads = service
            .provider()
            .operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Read(_)))
            .count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn responses_carry_etag_and_cache_control() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(64, 48), past())]);
        let response = service
            .handle(&ImageRequest::new("/photos/a.jpg").with_width(32))
            .unwrap();

        assert_eq!(response.cache_control, "public, max-age=31536000");
        let etag = response.etag.unwrap();
        assert!(etag.starts_with('"') && etag.ends_with('"'));
    }

    #[test]
    fn matching_etag_returns_304_with_empty_body() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(64, 48), past())]);
        let request = ImageRequest::new("/photos/a.jpg").with_width(32);

        let first = service.handle(&request).unwrap();
        let etag = first.etag.clone().unwrap();

        let mut revalidation = request.clone();
        revalidation.if_none_match = Some(etag.clone());
        let second = service.handle(&revalidation).unwrap();

        assert_eq!(second.status, 304);
        assert!(second.body.is_empty());
        assert_eq!(second.etag, Some(etag));
    }

    #[test]
    fn etag_match_without_cache_entry_regenerates() {
        // A matching ETag only short-circuits when a fresh entry exists;
        // with nothing on disk the derivative must be produced.
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(64, 48), past())]);
        let mut request = ImageRequest::new("/photos/a.jpg").with_width(32);
        request.if_none_match = Some("*".to_string());

        let response = service.handle(&request).unwrap();
        assert_eq!(response.status, 200);
        assert!(!response.body.is_empty());
    }

    #[test]
    fn entry_older_than_source_is_rebuilt() {
        // A source mtime ahead of the clock keeps every cache entry stale,
        // so the rebuild path is taken on each request.
        let tmp = TempDir::new().unwrap();
        let future = SystemTime::now() + Duration::from_secs(3_600);
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(64, 48), future)]);
        let request = ImageRequest::new("/photos/a.jpg").with_width(32);

        assert_eq!(service.handle(&request).unwrap().cache, CacheOutcome::Miss);
        assert_eq!(service.handle(&request).unwrap().cache, CacheOutcome::Stale);
    }

    #[test]
    fn stale_entry_never_short_circuits_to_304() {
        let tmp = TempDir::new().unwrap();
        let future = SystemTime::now() + Duration::from_secs(3_600);
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(64, 48), future)]);
        let request = ImageRequest::new("/photos/a.jpg").with_width(32);

        let first = service.handle(&request).unwrap();
        let mut revalidation = request.clone();
        revalidation.if_none_match = first.etag.clone();

        let second = service.handle(&revalidation).unwrap();
        assert_eq!(second.status, 200);
        assert_eq!(second.cache, CacheOutcome::Stale);
    }

    #[test]
    fn different_params_produce_distinct_entries() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(80, 60), past())]);

        let a = service
            .handle(&ImageRequest::new("/photos/a.jpg").with_width(40))
            .unwrap();
        let b = service
            .handle(&ImageRequest::new("/photos/a.jpg").with_width(60))
            .unwrap();

        assert_eq!(a.cache, CacheOutcome::Miss);
        assert_eq!(b.cache, CacheOutcome::Miss);
        assert_ne!(a.etag, b.etag);
    }

    #[test]
    fn proxied_src_unwraps_to_same_entry() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(80, 60), past())]);

        let direct = service
            .handle(&ImageRequest::new("/photos/a.jpg").with_width(40))
            .unwrap();
        let wrapped = service
            .handle(&ImageRequest::new("/img?src=%2Fphotos%2Fa.jpg&w=800").with_width(40))
            .unwrap();

        assert_eq!(wrapped.cache, CacheOutcome::Hit);
        assert_eq!(wrapped.body, direct.body);
    }

    #[test]
    fn cache_write_failure_still_serves_the_derivative() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(64, 48), past())]);

        // Pull the cache root out from under the store.
        std::fs::remove_dir_all(service.cache().root()).unwrap();

        let response = service
            .handle(&ImageRequest::new("/photos/a.jpg").with_width(32))
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(!response.body.is_empty());
    }

    // =========================================================================
    // Error mapping
    // =========================================================================

    #[test]
    fn missing_source_is_404_with_svg() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[]);

        let err = service
            .handle(&ImageRequest::new("/photos/gone.jpg"))
            .unwrap_err();
        assert!(matches!(err, ServeError::NotFound(_)));

        let response = service.respond(&ImageRequest::new("/photos/gone.jpg"));
        assert_eq!(response.status, 404);
        assert_eq!(response.content_type, "image/svg+xml");

        // A miss on the source must leave no trace in the cache.
        assert_eq!(std::fs::read_dir(service.cache().root()).unwrap().count(), 0);
    }

    #[test]
    fn remote_url_is_invalid_source() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[]);
        let err = service
            .handle(&ImageRequest::new("https://cdn.example.com/a.jpg"))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_source");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn unextractable_proxied_url_is_unwrap_error() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[]);
        let err = service
            .handle(&ImageRequest::new("/img?w=800&f=webp"))
            .unwrap_err();
        assert_eq!(err.kind(), "unwrap_error");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn undecodable_bytes_are_decode_error() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            &[("/photos/corrupt.jpg", b"not an image at all".to_vec(), past())],
        );
        let err = service
            .handle(&ImageRequest::new("/photos/corrupt.jpg"))
            .unwrap_err();
        assert_eq!(err.kind(), "decode_error");
        assert_eq!(err.status(), 500);

        let response = err.response();
        assert_eq!(response.content_type, "application/json");
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["error"], "decode_error");
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(ServeError::NotFound("x".into()).status(), 404);
        assert_eq!(ServeError::InvalidSource("x".into()).status(), 400);
        assert_eq!(ServeError::Unwrap("x".into()).status(), 400);
        assert_eq!(ServeError::Decode("x".into()).status(), 500);
        assert_eq!(ServeError::Encode("x".into()).status(), 500);
        assert_eq!(ServeError::CacheIo("x".into()).status(), 500);
        assert_eq!(ServeError::CacheIo("x".into()).kind(), "cache_io_error");
    }

    // =========================================================================
    // serve_query
    // =========================================================================

    #[test]
    fn serve_query_end_to_end() {
        // Small fixture: negotiation lands on AVIF, which encodes at the
        // slowest speed setting.
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[("/photos/a.jpg", jpeg_fixture(40, 30), past())]);

        let response = service.serve_query(
            "src=%2Fphotos%2Fa.jpg&w=20",
            Some("image/avif,image/webp"),
            None,
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "image/avif");
    }

    #[test]
    fn serve_query_maps_parse_failures_to_400() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(&tmp, &[]);

        let response = service.serve_query("src=%2Fa.jpg&w=999999", None, None);
        assert_eq!(response.status, 400);
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["error"], "invalid_source");
    }
}
