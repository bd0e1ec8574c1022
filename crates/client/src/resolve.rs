//! Relative-to-absolute URL resolution.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SCHEME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+.-]+:").expect("scheme pattern is valid"));

static ABSOLUTE_BASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[\w\-.]+").expect("base pattern is valid"));

/// Whether `url` can serve as a base for [`resolve`] when rewriting documents.
pub fn is_absolute_base(url: &str) -> bool {
    ABSOLUTE_BASE.is_match(url)
}

/// Resolve `reference` against `base`.
///
/// References with a scheme are returned unchanged, as is every reference
/// when `base` does not parse or has no host. Path-absolute references are
/// joined to the base origin, network-path references (`//host/x`) take the
/// base scheme, and anything else is merged with the directory of the base
/// path before dot-segment removal.
pub fn resolve(reference: &str, base: &str) -> String {
    if SCHEME_PREFIX.is_match(reference) {
        return reference.to_string();
    }
    let Ok(base) = Url::parse(base) else {
        return reference.to_string();
    };
    let Some(host) = base.host_str() else {
        return reference.to_string();
    };

    if let Some(network_path) = reference.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), network_path);
    }

    let origin = match base.port() {
        Some(port) => format!("{}://{}:{}", base.scheme(), host, port),
        None => format!("{}://{}", base.scheme(), host),
    };

    if reference.starts_with('/') {
        return format!("{origin}{reference}");
    }

    let base_path = base.path();
    let directory = base_path.rfind('/').map_or("/", |i| &base_path[..=i]);
    let split = reference.find(['?', '#']).unwrap_or(reference.len());
    let (path, suffix) = reference.split_at(split);

    format!("{origin}{}{suffix}", remove_dot_segments(&format!("{directory}{path}")))
}

/// RFC 3986 section 5.2.4 over an absolute path.
fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let mut trailing_slash = false;

    for segment in path.trim_start_matches('/').split('/') {
        trailing_slash = false;
        match segment {
            "." => trailing_slash = true,
            ".." => {
                output.pop();
                trailing_slash = true;
            }
            _ => output.push(segment),
        }
    }

    let mut resolved = format!("/{}", output.join("/"));
    if trailing_slash && !resolved.ends_with('/') {
        resolved.push('/');
    }
    resolved
}
