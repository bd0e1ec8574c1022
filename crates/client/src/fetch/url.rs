//! Target URL validation for the fetcher.

use regex::Regex;
use std::sync::LazyLock;

static TARGET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\w[\w\-.]+").expect("target URL pattern is valid"));

/// Error type for URL validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("URL must be an absolute http(s) URL: {0}")]
    NotHttp(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Validate and normalize a target URL before any network I/O.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Turn HTML-escaped `&amp;` back into `&`
/// 3. Require an `http`/`https` scheme followed by a host starting with a word character
/// 4. Require the result to parse with a host
///
/// Returns the normalized string, which is what gets fingerprinted and sent.
pub fn validate_target(input: &str) -> Result<String, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let normalized = trimmed.replace("&amp;", "&");
    if !TARGET_PATTERN.is_match(&normalized) {
        return Err(UrlError::NotHttp(normalized));
    }

    let parsed = url::Url::parse(&normalized).map_err(|e| UrlError::InvalidUrl(format!("{normalized}: {e}")))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::InvalidUrl(format!("{normalized}: missing host")));
    }

    Ok(normalized)
}

/// Whether the URL as written has no path component (`http://example.com`,
/// `http://example.com?q=1`).
pub fn has_empty_path(url: &str) -> bool {
    let Some((_, rest)) = url.split_once("://") else {
        return false;
    };
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    !rest[authority_end..].starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_basic() {
        assert_eq!(validate_target("https://example.com/a").unwrap(), "https://example.com/a");
        assert_eq!(validate_target("HTTP://Example.com").unwrap(), "HTTP://Example.com");
    }

    #[test]
    fn test_validate_trims_and_unescapes() {
        assert_eq!(
            validate_target("  http://example.com/?a=1&amp;b=2 ").unwrap(),
            "http://example.com/?a=1&b=2"
        );
    }

    #[test]
    fn test_validate_rejects_other_schemes() {
        assert!(matches!(validate_target("ftp://example.com/"), Err(UrlError::NotHttp(_))));
        assert!(matches!(validate_target("file:///etc/passwd"), Err(UrlError::NotHttp(_))));
        assert!(matches!(validate_target("example.com"), Err(UrlError::NotHttp(_))));
    }

    #[test]
    fn test_validate_rejects_bad_host_start() {
        assert!(matches!(validate_target("http://-bad.com/"), Err(UrlError::NotHttp(_))));
        assert!(matches!(validate_target("http:///path"), Err(UrlError::NotHttp(_))));
    }

    #[test]
    fn test_validate_empty() {
        assert!(matches!(validate_target(""), Err(UrlError::Empty)));
        assert!(matches!(validate_target("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_has_empty_path() {
        assert!(has_empty_path("http://example.com"));
        assert!(has_empty_path("http://example.com:8080"));
        assert!(has_empty_path("http://example.com?q=1"));
        assert!(!has_empty_path("http://example.com/"));
        assert!(!has_empty_path("http://example.com/a/b"));
        assert!(!has_empty_path("not a url"));
    }
}
