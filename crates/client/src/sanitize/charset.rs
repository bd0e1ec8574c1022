//! Charset resolution and conversion to UTF-8.
//!
//! Resolution order: the `charset` parameter of the HTTP Content-Type, a
//! `<meta http-equiv="Content-Type">` declaration, an HTML5 `<meta charset>`
//! declaration, then statistical detection. The body is always converted,
//! even when it claims to be UTF-8.

use super::vault::{DecodedVault, Vault};
use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tidyscrape_core::Error;

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is-u)<meta\b[^>]*?>").expect("meta pattern is valid"));
static HTTP_EQUIV: LazyLock<Regex> = LazyLock::new(|| attribute_pattern("http-equiv"));
static CONTENT: LazyLock<Regex> = LazyLock::new(|| attribute_pattern("content"));
static CHARSET: LazyLock<Regex> = LazyLock::new(|| attribute_pattern("charset"));

fn attribute_pattern(name: &str) -> Regex {
    Regex::new(&format!(r#"(?is-u)[\s'"]\b{name}\b\s*=\s*([^\s'">]+|'[^']+'|"[^"]+")"#))
        .expect("attribute pattern is valid")
}

/// Where the charset of a body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    Header,
    MetaHttpEquiv,
    MetaCharset,
    Detected,
}

/// A resolved encoding and its provenance.
#[derive(Debug, Clone, Copy)]
pub struct Charset {
    pub encoding: &'static Encoding,
    pub source: CharsetSource,
}

impl Charset {
    /// Decode `bytes` to UTF-8.
    ///
    /// Declared charsets fall back to lossy conversion on malformed input; a
    /// detected charset that does not decode cleanly is a detection failure.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, Error> {
        if let Some(text) = self
            .encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
        {
            return Ok(text.into_owned());
        }

        if self.source == CharsetSource::Detected {
            return Err(Error::EncodingDetection(format!(
                "detected {} but the body is not valid in it",
                self.encoding.name()
            )));
        }

        tracing::warn!(
            charset = self.encoding.name(),
            source = ?self.source,
            "malformed byte sequences, converting lossily"
        );
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        Ok(text.into_owned())
    }
}

/// Resolve the charset of a (guarded) body.
pub fn resolve(body: &[u8], content_type: Option<&str>) -> Result<Charset, Error> {
    if let Some(label) = content_type.and_then(charset_from_content_type) {
        return Ok(Charset { encoding: lookup(&label)?, source: CharsetSource::Header });
    }

    let metas: Vec<&[u8]> = META_TAG.find_iter(body).map(|m| m.as_bytes()).collect();

    let http_equiv = metas.iter().find_map(|meta| {
        let equiv = attribute(&HTTP_EQUIV, meta)?;
        if !equiv.eq_ignore_ascii_case(b"content-type") {
            return None;
        }
        attribute(&CONTENT, meta)
    });
    if let Some(content) = http_equiv
        && let Some(label) = charset_from_content_type(&String::from_utf8_lossy(&content))
    {
        return Ok(Charset { encoding: html_meta_encoding(lookup(&label)?), source: CharsetSource::MetaHttpEquiv });
    }

    let meta_charset = metas
        .iter()
        .filter(|meta| attribute(&HTTP_EQUIV, meta).is_none())
        .find_map(|meta| attribute(&CHARSET, meta));
    if let Some(label) = meta_charset {
        let label = normalize_label(String::from_utf8_lossy(&label).trim());
        return Ok(Charset { encoding: html_meta_encoding(lookup(&label)?), source: CharsetSource::MetaCharset });
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    Ok(Charset { encoding, source: CharsetSource::Detected })
}

/// Resolve the charset and convert both the body and the vault fragments.
pub fn convert(body: &[u8], vault: Vault, content_type: Option<&str>) -> Result<(String, DecodedVault), Error> {
    let charset = resolve(body, content_type)?;
    tracing::debug!(
        charset = charset.encoding.name(),
        source = ?charset.source,
        vault_size = vault.len(),
        "resolved charset"
    );

    let text = charset.decode(body)?;
    let vault = vault.decode_with(|fragment| charset.decode(fragment))?;
    Ok((text, vault))
}

/// Extract the `charset` parameter of a Content-Type value, `UTF-8` normalized.
pub fn charset_from_content_type(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (name, charset) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let charset = charset.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        (!charset.is_empty()).then(|| normalize_label(charset))
    })
}

fn normalize_label(label: &str) -> String {
    let upper = label.to_ascii_uppercase();
    if upper == "UTF8" || upper == "UTF-8" { "UTF-8".to_string() } else { label.to_string() }
}

fn lookup(label: &str) -> Result<&'static Encoding, Error> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| Error::EncodingConversion(format!("unsupported charset '{label}'")))
}

/// A document that declares UTF-16 in its own markup was necessarily read as
/// an ASCII-compatible encoding, so the declaration means UTF-8.
fn html_meta_encoding(encoding: &'static Encoding) -> &'static Encoding {
    if encoding == encoding_rs::UTF_16LE || encoding == encoding_rs::UTF_16BE { UTF_8 } else { encoding }
}

fn attribute(pattern: &Regex, tag: &[u8]) -> Option<Vec<u8>> {
    let value = pattern.captures(tag)?.get(1)?.as_bytes();
    Some(unquote(value).into_owned())
}

fn unquote(value: &[u8]) -> Cow<'_, [u8]> {
    match value {
        [b'"', inner @ .., b'"'] | [b'\'', inner @ .., b'\''] if !inner.is_empty() => Cow::Borrowed(inner),
        _ => Cow::Borrowed(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(charset_from_content_type("text/html; charset=Shift_JIS").as_deref(), Some("Shift_JIS"));
        assert_eq!(charset_from_content_type("text/html;charset=\"utf8\"").as_deref(), Some("UTF-8"));
        assert_eq!(charset_from_content_type("text/html; Charset = utf-8").as_deref(), Some("UTF-8"));
        assert_eq!(charset_from_content_type("text/html"), None);
        assert_eq!(charset_from_content_type("text/html; charset="), None);
    }

    #[test]
    fn test_header_wins() {
        let body = b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=euc-jp\"><p>x</p>";
        let charset = resolve(body, Some("text/html; charset=Shift_JIS")).unwrap();
        assert_eq!(charset.encoding, encoding_rs::SHIFT_JIS);
        assert_eq!(charset.source, CharsetSource::Header);
    }

    #[test]
    fn test_meta_http_equiv() {
        let body = b"<head><meta name=x content=y><META HTTP-EQUIV='content-type' CONTENT='text/html; charset=EUC-JP'></head>";
        let charset = resolve(body, Some("text/html")).unwrap();
        assert_eq!(charset.encoding, encoding_rs::EUC_JP);
        assert_eq!(charset.source, CharsetSource::MetaHttpEquiv);
    }

    #[test]
    fn test_meta_charset() {
        let body = b"<head><meta charset=\"windows-1251\"></head>";
        let charset = resolve(body, None).unwrap();
        assert_eq!(charset.encoding, encoding_rs::WINDOWS_1251);
        assert_eq!(charset.source, CharsetSource::MetaCharset);
    }

    #[test]
    fn test_meta_utf16_means_utf8() {
        let body = b"<meta charset=utf-16><p>x</p>";
        assert_eq!(resolve(body, None).unwrap().encoding, UTF_8);
    }

    #[test]
    fn test_detection_fallback() {
        let charset = resolve("<p>héllo wörld</p>".as_bytes(), None).unwrap();
        assert_eq!(charset.source, CharsetSource::Detected);
        assert_eq!(charset.encoding, UTF_8);
    }

    #[test]
    fn test_unknown_label_is_conversion_error() {
        let err = resolve(b"<p>x</p>", Some("text/html; charset=x-unknown-42")).unwrap_err();
        assert!(matches!(err, Error::EncodingConversion(_)));
    }

    #[test]
    fn test_declared_charset_converts_lossily() {
        let charset = Charset { encoding: UTF_8, source: CharsetSource::Header };
        assert_eq!(charset.decode(b"a\xffb").unwrap(), "a\u{FFFD}b");
    }

    #[test]
    fn test_detected_charset_must_decode_cleanly() {
        let charset = Charset { encoding: UTF_8, source: CharsetSource::Detected };
        assert!(matches!(charset.decode(b"a\xffb"), Err(Error::EncodingDetection(_))));
    }

    #[test]
    fn test_convert_shift_jis_body_and_vault() {
        let (body, _, _) = encoding_rs::SHIFT_JIS.encode("<p>日本語</p><restore count=\"0\" />");
        let (comment, _, _) = encoding_rs::SHIFT_JIS.encode("<!-- 注釈 -->");
        let mut vault = Vault::for_document(b"");
        vault.store(&comment);

        let (text, vault) = convert(&body, vault, Some("text/html; charset=Shift_JIS")).unwrap();
        assert_eq!(vault.restore_all(&text), "<p>日本語</p><!-- 注釈 -->");
    }
}
