//! The transport-facing request and response contract.
//!
//! Nothing in this crate speaks HTTP. A host embeds the service behind
//! whatever server it already runs and maps its framework's request into an
//! [`ImageRequest`] (usually via [`ImageRequest::from_query`]) and an
//! [`ImageResponse`] back out. The response carries exactly what a handler
//! needs to emit: status, content type, caching headers, and the body.
//!
//! Query parameters are strict: unknown names are rejected rather than
//! ignored, so a typo like `wdith=400` fails loudly instead of silently
//! serving the full-size image. Values are validated on parse — dimensions
//! against the configured cap, quality against 1-100, blur against a sane
//! positive range.

use thiserror::Error;

use crate::cache::CacheOutcome;
use crate::format::{OutputFormat, negotiate};
use crate::transform::{Fit, Position, Quality, TransformConfig};

/// Largest accepted blur sigma. Past this the output is a flat smear and
/// the gaussian pass is pure waste.
const MAX_BLUR_SIGMA: f32 = 100.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing required parameter: src")]
    MissingSrc,
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
    #[error("{name} must be at most {max}")]
    DimensionTooLarge { name: &'static str, max: u32 },
}

/// One derivative request, independent of transport.
///
/// `accept` and `if_none_match` are the raw `Accept` and `If-None-Match`
/// header values when the host has them; both influence the response (format
/// negotiation and 304 short-circuiting) but never the cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub src: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Explicit output format. `None` falls back to `Accept` negotiation.
    pub format: Option<OutputFormat>,
    pub quality: Option<Quality>,
    pub fit: Fit,
    pub position: Position,
    pub blur: Option<f32>,
    pub sharpen: bool,
    pub accept: Option<String>,
    pub if_none_match: Option<String>,
}

impl ImageRequest {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            width: None,
            height: None,
            format: None,
            quality: None,
            fit: Fit::default(),
            position: Position::default(),
            blur: None,
            sharpen: false,
            accept: None,
            if_none_match: None,
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

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Parse a raw query string (`src=...&w=400&f=webp`).
    ///
    /// Accepted parameters: `src`, `w`, `h`, `f`, `q`, `fit`, `position`,
    /// `blur`, `sharpen`. Repeating a parameter keeps the last value, the
    /// usual form convention. Anything else is an error.
    pub fn from_query(query: &str, max_dimension: u32) -> Result<Self, RequestError> {
        let mut src = None;
        let mut request = Self::new(String::new());

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "src" => src = Some(value.into_owned()),
                "w" => request.width = Some(parse_dimension("w", &value, max_dimension)?),
                "h" => request.height = Some(parse_dimension("h", &value, max_dimension)?),
                "f" => {
                    request.format =
                        Some(OutputFormat::parse(&value).ok_or_else(|| invalid("f", &value))?)
                }
                "q" => request.quality = Some(parse_quality(&value)?),
                "fit" => request.fit = Fit::parse(&value).ok_or_else(|| invalid("fit", &value))?,
                "position" => {
                    request.position =
                        Position::parse(&value).ok_or_else(|| invalid("position", &value))?
                }
                "blur" => request.blur = Some(parse_blur(&value)?),
                "sharpen" => request.sharpen = parse_flag("sharpen", &value)?,
                other => return Err(RequestError::UnknownParameter(other.to_string())),
            }
        }

        request.src = src.ok_or(RequestError::MissingSrc)?;
        Ok(request)
    }

    /// The transform this request asks for, with the output format resolved
    /// (explicit `f` wins, otherwise `Accept` negotiation).
    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            width: self.width,
            height: self.height,
            format: self
                .format
                .unwrap_or_else(|| negotiate(self.accept.as_deref())),
            quality: self.quality,
            fit: self.fit,
            position: self.position,
            blur: self.blur,
            sharpen: self.sharpen,
        }
    }

    /// Whether the request's `If-None-Match` covers `etag`. Handles the
    /// wildcard and comma-separated candidate lists; weak candidates match
    /// too, since a derivative is byte-for-byte reproducible.
    pub fn matches_etag(&self, etag: &str) -> bool {
        match self.if_none_match.as_deref() {
            Some("*") => true,
            Some(header) => header
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate.strip_prefix("W/").unwrap_or(candidate) == etag),
            None => false,
        }
    }
}

fn invalid(name: &'static str, value: &str) -> RequestError {
    RequestError::InvalidValue {
        name,
        value: value.to_string(),
    }
}

fn parse_dimension(name: &'static str, value: &str, max: u32) -> Result<u32, RequestError> {
    let parsed: u32 = value.parse().map_err(|_| invalid(name, value))?;
    if parsed == 0 {
        return Err(invalid(name, value));
    }
    if parsed > max {
        return Err(RequestError::DimensionTooLarge { name, max });
    }
    Ok(parsed)
}

fn parse_quality(value: &str) -> Result<Quality, RequestError> {
    let parsed: u32 = value.parse().map_err(|_| invalid("q", value))?;
    if !(1..=100).contains(&parsed) {
        return Err(invalid("q", value));
    }
    Ok(Quality::new(parsed))
}

fn parse_blur(value: &str) -> Result<f32, RequestError> {
    let sigma: f32 = value.parse().map_err(|_| invalid("blur", value))?;
    if !sigma.is_finite() || sigma <= 0.0 || sigma > MAX_BLUR_SIGMA {
        return Err(invalid("blur", value));
    }
    Ok(sigma)
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, RequestError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

/// SVG served as the body of a 404, so a broken `<img>` degrades into a
/// visible pictogram instead of the browser's broken-image glyph.
pub const NOT_FOUND_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="150" viewBox="0 0 200 150">
  <rect width="200" height="150" fill="#e5e5e5"/>
  <circle cx="72" cy="48" r="9" fill="#b0b0b0"/>
  <path d="M60 95l30-40 20 26 12-15 18 29z" fill="#b0b0b0"/>
  <text x="100" y="130" font-family="sans-serif" font-size="12" fill="#808080" text-anchor="middle">image not found</text>
</svg>
"##;

/// Everything a host handler needs to emit a response.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub cache_control: String,
    pub etag: Option<String>,
    pub body: Vec<u8>,
    /// How the lookup was satisfied. Diagnostic only, not a header.
    pub cache: CacheOutcome,
}

impl ImageResponse {
    /// A finished derivative.
    pub fn derivative(
        body: Vec<u8>,
        format: OutputFormat,
        etag: String,
        client_max_age: u64,
        cache: CacheOutcome,
    ) -> Self {
        Self {
            status: 200,
            content_type: format.mime(),
            cache_control: format!("public, max-age={client_max_age}"),
            etag: Some(etag),
            body,
            cache,
        }
    }

    /// The client's cached copy is still good.
    pub fn not_modified(format: OutputFormat, etag: String, client_max_age: u64) -> Self {
        Self {
            status: 304,
            content_type: format.mime(),
            cache_control: format!("public, max-age={client_max_age}"),
            etag: Some(etag),
            body: Vec::new(),
            cache: CacheOutcome::Hit,
        }
    }

    /// Machine-readable error body: `{"error": kind, "message": ...}`.
    pub fn error_json(status: u16, kind: &str, message: &str) -> Self {
        let body = serde_json::to_vec(&serde_json::json!({
            "error": kind,
            "message": message,
        }))
        .expect("error body must serialize");
        Self {
            status,
            content_type: "application/json",
            cache_control: "no-store".to_string(),
            etag: None,
            body,
            cache: CacheOutcome::Miss,
        }
    }

    /// Missing source: 404 with the SVG body.
    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "image/svg+xml",
            cache_control: "no-store".to_string(),
            etag: None,
            body: NOT_FOUND_SVG.as_bytes().to_vec(),
            cache: CacheOutcome::Miss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;

    const MAX_DIM: u32 = 4096;

    // =========================================================================
    // Query parsing
    // =========================================================================

    #[test]
    fn parse_minimal_query() {
        let request = ImageRequest::from_query("src=/photos/dawn.jpg", MAX_DIM).unwrap();
        assert_eq!(request.src, "/photos/dawn.jpg");
        assert_eq!(request.width, None);
        assert_eq!(request.format, None);
        assert_eq!(request.fit, Fit::Cover);
        assert!(!request.sharpen);
    }

    #[test]
    fn parse_full_query() {
        let request = ImageRequest::from_query(
            "src=/p.jpg&w=400&h=300&f=webp&q=70&fit=contain&position=top&blur=2.5&sharpen=1",
            MAX_DIM,
        )
        .unwrap();
        assert_eq!(request.width, Some(400));
        assert_eq!(request.height, Some(300));
        assert_eq!(request.format, Some(OutputFormat::Webp));
        assert_eq!(request.quality, Some(Quality::new(70)));
        assert_eq!(request.fit, Fit::Contain);
        assert_eq!(request.position, Position::Top);
        assert_eq!(request.blur, Some(2.5));
        assert!(request.sharpen);
    }

    #[test]
    fn parse_decodes_percent_encoding() {
        let request =
            ImageRequest::from_query("src=%2Fphotos%2Fwinter%20light.jpg", MAX_DIM).unwrap();
        assert_eq!(request.src, "/photos/winter light.jpg");
    }

    #[test]
    fn missing_src_is_rejected() {
        assert_eq!(
            ImageRequest::from_query("w=400", MAX_DIM),
            Err(RequestError::MissingSrc)
        );
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        assert_eq!(
            ImageRequest::from_query("src=/p.jpg&wdith=400", MAX_DIM),
            Err(RequestError::UnknownParameter("wdith".to_string()))
        );
    }

    #[test]
    fn repeated_parameter_keeps_last() {
        let request = ImageRequest::from_query("src=/p.jpg&w=100&w=200", MAX_DIM).unwrap();
        assert_eq!(request.width, Some(200));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(ImageRequest::from_query("src=/p.jpg&w=0", MAX_DIM).is_err());
    }

    #[test]
    fn oversize_dimension_is_rejected() {
        assert_eq!(
            ImageRequest::from_query("src=/p.jpg&h=5000", MAX_DIM),
            Err(RequestError::DimensionTooLarge { name: "h", max: MAX_DIM })
        );
    }

    #[test]
    fn garbage_dimension_is_rejected() {
        assert!(ImageRequest::from_query("src=/p.jpg&w=abc", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&w=", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&w=-4", MAX_DIM).is_err());
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        assert!(ImageRequest::from_query("src=/p.jpg&q=0", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&q=101", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&q=high", MAX_DIM).is_err());
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(ImageRequest::from_query("src=/p.jpg&f=bmp", MAX_DIM).is_err());
    }

    #[test]
    fn bad_blur_values_are_rejected() {
        assert!(ImageRequest::from_query("src=/p.jpg&blur=0", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&blur=-1", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&blur=nan", MAX_DIM).is_err());
        assert!(ImageRequest::from_query("src=/p.jpg&blur=500", MAX_DIM).is_err());
    }

    #[test]
    fn bad_sharpen_value_is_rejected() {
        assert!(ImageRequest::from_query("src=/p.jpg&sharpen=yes", MAX_DIM).is_err());
    }

    // =========================================================================
    // Transform resolution
    // =========================================================================

    #[test]
    fn explicit_format_wins_over_accept() {
        let mut request = ImageRequest::from_query("src=/p.jpg&f=png", MAX_DIM).unwrap();
        request.accept = Some("image/avif,image/webp".to_string());
        assert_eq!(request.transform_config().format, OutputFormat::Png);
    }

    #[test]
    fn format_negotiated_from_accept_when_unset() {
        let mut request = ImageRequest::new("/p.jpg");
        request.accept = Some("image/avif,image/webp,*/*".to_string());
        assert_eq!(request.transform_config().format, OutputFormat::Avif);
    }

    #[test]
    fn format_defaults_to_jpeg_without_accept() {
        let request = ImageRequest::new("/p.jpg");
        assert_eq!(request.transform_config().format, OutputFormat::Jpeg);
    }

    #[test]
    fn permuted_queries_share_a_cache_key() {
        let a = ImageRequest::from_query("src=/p.jpg&w=400&q=70&f=webp", MAX_DIM).unwrap();
        let b = ImageRequest::from_query("f=webp&q=70&w=400&src=/p.jpg", MAX_DIM).unwrap();
        assert_eq!(
            CacheKey::new(&a.src, &a.transform_config()),
            CacheKey::new(&b.src, &b.transform_config())
        );
    }

    // =========================================================================
    // ETag matching
    // =========================================================================

    #[test]
    fn etag_exact_match() {
        let mut request = ImageRequest::new("/p.jpg");
        request.if_none_match = Some("\"abc-def\"".to_string());
        assert!(request.matches_etag("\"abc-def\""));
        assert!(!request.matches_etag("\"other\""));
    }

    #[test]
    fn etag_list_and_weak_match() {
        let mut request = ImageRequest::new("/p.jpg");
        request.if_none_match = Some("\"x\", W/\"abc-def\"".to_string());
        assert!(request.matches_etag("\"abc-def\""));
    }

    #[test]
    fn etag_wildcard_matches_anything() {
        let mut request = ImageRequest::new("/p.jpg");
        request.if_none_match = Some("*".to_string());
        assert!(request.matches_etag("\"whatever\""));
    }

    #[test]
    fn etag_absent_never_matches() {
        let request = ImageRequest::new("/p.jpg");
        assert!(!request.matches_etag("\"abc\""));
    }

    // =========================================================================
    // Responses
    // =========================================================================

    #[test]
    fn derivative_response_shape() {
        let response = ImageResponse::derivative(
            vec![1, 2, 3],
            OutputFormat::Webp,
            "\"k\"".to_string(),
            31_536_000,
            CacheOutcome::Miss,
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "image/webp");
        assert_eq!(response.cache_control, "public, max-age=31536000");
        assert_eq!(response.etag.as_deref(), Some("\"k\""));
        assert_eq!(response.body, vec![1, 2, 3]);
    }

    #[test]
    fn not_modified_has_empty_body() {
        let response = ImageResponse::not_modified(OutputFormat::Avif, "\"k\"".to_string(), 60);
        assert_eq!(response.status, 304);
        assert!(response.body.is_empty());
        assert_eq!(response.etag.as_deref(), Some("\"k\""));
    }

    #[test]
    fn error_json_is_machine_readable() {
        let response = ImageResponse::error_json(400, "invalid_source", "remote URLs are not served");
        assert_eq!(response.status, 400);
        assert_eq!(response.content_type, "application/json");
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["error"], "invalid_source");
        assert_eq!(value["message"], "remote URLs are not served");
    }

    #[test]
    fn not_found_serves_svg() {
        let response = ImageResponse::not_found();
        assert_eq!(response.status, 404);
        assert_eq!(response.content_type, "image/svg+xml");
        assert!(String::from_utf8(response.body).unwrap().contains("<svg"));
    }
}
