//! Deterministic cache key generation.
//!
//! A fingerprint identifies one request: the target URL plus every header
//! override and form field, sorted and form-URL-encoded, hashed with SHA-256.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::form_urlencoded::byte_serialize;

/// Compute the fingerprint of a request.
///
/// Header keys are compared case-insensitively and headers with empty values
/// are ignored, mirroring what is actually sent on the wire.
pub fn compute_fingerprint(url: &str, headers: &BTreeMap<String, String>, post: &BTreeMap<String, String>) -> String {
    let header_params: BTreeMap<String, &str> = headers
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_ascii_lowercase(), value.as_str()))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"?");
    hasher.update(encode_params(header_params.iter().map(|(k, v)| (k.as_str(), *v))).as_bytes());
    hasher.update(b"\n");
    hasher.update(encode_params(post.iter().map(|(k, v)| (k.as_str(), v.as_str()))).as_bytes());
    hex::encode(hasher.finalize())
}

fn encode_params<'a>(params: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    params
        .map(|(key, value)| {
            format!(
                "{}={}",
                byte_serialize(key.as_bytes()).collect::<String>(),
                byte_serialize(value.as_bytes()).collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
