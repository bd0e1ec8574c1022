//! Markup guard: byte-level transforms that make tag soup safe for a strict
//! XML round trip.
//!
//! Stages run in a fixed order; later stages assume the earlier ones ran.
//! All patterns work on raw bytes since the charset is not known yet.

use super::vault::Vault;
use regex::bytes::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;
use tidyscrape_core::Error;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).expect("guard pattern is valid"));
    };
}

pattern!(FIRST_TAG, r"(?-u)<\w+[^>]*?>");
pattern!(SCRIPT, r"(?is-u)<script\b[^>]*?>.*?</script\b[^>]*?>");
pattern!(STYLE, r"(?is-u)<style\b[^>]*?>.*?</style\b[^>]*?>");
pattern!(CDATA, r"(?s-u)<!\[CDATA\[.*?\]\]>");
pattern!(COMMENT_BODY, r"(?is-u)<!--(.*?)-->");
pattern!(HYPHENS, r"(?-u)-{2,}");
pattern!(COMMENT, r"(?s-u)<!--.*?-->");
pattern!(TEXTAREA, r"(?is-u)(<textarea\b[^>]*?>)(.*?)(</textarea\b[^>]*?>)");
pattern!(XMP, r"(?is-u)<xmp\b[^>]*?>(.*?)</xmp\b[^>]*?>");
pattern!(PLAINTEXT, r"(?is-u)<plaintext\b[^>]*?>(.*)$");
pattern!(DECLARATION, r"(?is-u)<![^>]*?>");
pattern!(DOCTYPE, r"(?is-u)<!DOCTYPE\b[^>]*?>");
pattern!(XML_DECLARATION, r"(?is-u)<\?xml\b[^>]*?\?>");

const BOM: &[u8] = b"\xef\xbb\xbf";

/// Reject bodies the pipeline cannot work with.
///
/// The body must be non-empty and contain a start tag, and that first tag
/// must not contain a NUL byte.
pub fn check_body(body: &[u8]) -> Result<(), Error> {
    if body.is_empty() {
        return Err(Error::EmptyBody);
    }
    match FIRST_TAG.find(body) {
        None => Err(Error::NoMarkupFound),
        Some(tag) if tag.as_bytes().contains(&0) => Err(Error::ContainsNull),
        Some(_) => Ok(()),
    }
}

/// Strip a leading UTF-8 byte-order mark and every NUL byte.
pub fn strip_bom_and_nulls(body: &[u8]) -> Vec<u8> {
    let body = body.strip_prefix(BOM).unwrap_or(body);
    body.iter().copied().filter(|&b| b != 0).collect()
}

/// Whether nothing but whitespace is left.
pub fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Run every guard stage over `body`, moving CDATA sections and comments into `vault`.
pub fn guard(body: &[u8], vault: &mut Vault) -> Vec<u8> {
    let body = SCRIPT.replace_all(body, &b""[..]);
    let body = own(STYLE.replace_all(&body, &b""[..]));

    let body = own(CDATA.replace_all(&body, |caps: &Captures| stash(vault, &caps[0])));

    let body = own(COMMENT_BODY.replace_all(&body, |caps: &Captures| {
        let mut comment = b"<!-- ".to_vec();
        comment.extend_from_slice(&HYPHENS.replace_all(&caps[1], &b"-"[..]));
        comment.extend_from_slice(b" -->");
        comment
    }));
    let body = own(COMMENT.replace_all(&body, |caps: &Captures| stash(vault, &caps[0])));

    // Raw-text regions may now hold vault markers, which must stay intact.
    let marker = format!("<{} count=\"", vault.tag());
    let body = own(TEXTAREA.replace_all(&body, |caps: &Captures| {
        let mut textarea = caps[1].to_vec();
        textarea.extend_from_slice(&escape_lt(&caps[2], &marker));
        textarea.extend_from_slice(&caps[3]);
        textarea
    }));
    let body = own(XMP.replace_all(&body, |caps: &Captures| pre(&caps[1], &marker)));
    let body = own(PLAINTEXT.replace_all(&body, |caps: &Captures| pre(&caps[1], &marker)));

    let body = own(DECLARATION.replace_all(&body, |caps: &Captures| {
        if is_doctype(&caps[0]) { caps[0].to_vec() } else { Vec::new() }
    }));
    let body = own(DOCTYPE.replace_all(&body, &b""[..]));
    own(XML_DECLARATION.replace_all(&body, &b""[..]))
}

fn own(bytes: Cow<'_, [u8]>) -> Vec<u8> {
    bytes.into_owned()
}

fn stash(vault: &mut Vault, fragment: &[u8]) -> Vec<u8> {
    let index = vault.store(fragment);
    vault.marker(index).into_bytes()
}

/// Escape every `<` except those opening a vault marker (`marker` is the
/// marker prefix up to the index).
fn escape_lt(text: &[u8], marker: &str) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(text.len());
    let mut rest = text;
    while let Some((&b, tail)) = rest.split_first() {
        if b != b'<' {
            escaped.push(b);
            rest = tail;
            continue;
        }
        match rest.starts_with(marker.as_bytes()).then(|| rest.iter().position(|&c| c == b'>')) {
            Some(Some(end)) => {
                escaped.extend_from_slice(&rest[..=end]);
                rest = &rest[end + 1..];
            }
            _ => {
                escaped.extend_from_slice(b"&lt;");
                rest = tail;
            }
        }
    }
    escaped
}

fn pre(content: &[u8], marker: &str) -> Vec<u8> {
    let mut pre = b"<pre>".to_vec();
    pre.extend_from_slice(&escape_lt(content, marker));
    pre.extend_from_slice(b"</pre>");
    pre
}

fn is_doctype(declaration: &[u8]) -> bool {
    declaration
        .get(2..9)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case(b"DOCTYPE"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(body: &str) -> (String, Vault) {
        let mut vault = Vault::for_document(body.as_bytes());
        let guarded = guard(body.as_bytes(), &mut vault);
        (String::from_utf8(guarded).unwrap(), vault)
    }

    #[test]
    fn test_check_body() {
        assert!(matches!(check_body(b""), Err(Error::EmptyBody)));
        assert!(matches!(check_body(b"just text"), Err(Error::NoMarkupFound)));
        assert!(matches!(check_body(b"<p\0 class=x>"), Err(Error::ContainsNull)));
        assert!(check_body(b"text <p>x</p>\0").is_ok());
    }

    #[test]
    fn test_strip_bom_and_nulls() {
        assert_eq!(strip_bom_and_nulls(b"\xef\xbb\xbf<p>a\0b</p>"), b"<p>ab</p>");
        assert_eq!(strip_bom_and_nulls(b"<p>\xef\xbb\xbf</p>"), b"<p>\xef\xbb\xbf</p>");
    }

    #[test]
    fn test_removes_script_and_style() {
        let (body, vault) = run("<p>a</p><SCRIPT type=x>alert(1)</script ><style>p{}</STYLE><p>b</p>");
        assert_eq!(body, "<p>a</p><p>b</p>");
        assert!(vault.is_empty());
    }

    #[test]
    fn test_vaults_cdata_then_comments() {
        let (body, vault) = run("<p><![CDATA[x<y]]></p><!-- note --><p>z</p>");
        assert_eq!(body, "<p><restore count=\"0\" /></p><restore count=\"1\" /><p>z</p>");
        assert_eq!(vault.fragments()[0], b"<![CDATA[x<y]]>");
        assert_eq!(vault.fragments()[1], b"<!--  note  -->");
    }

    #[test]
    fn test_collapses_comment_hyphens() {
        let (_, vault) = run("<p>x</p><!-- a -- b ---- c -->");
        let comment = String::from_utf8(vault.fragments()[0].clone()).unwrap();
        assert_eq!(comment, "<!--  a - b - c  -->");
        assert!(!comment[4..comment.len() - 3].contains("--"));
    }

    #[test]
    fn test_escapes_textarea() {
        let (body, _) = run("<textarea name=t><b>bold</b></textarea>");
        assert_eq!(body, "<textarea name=t>&lt;b>bold&lt;/b></textarea>");
    }

    #[test]
    fn test_textarea_keeps_vault_markers() {
        let (body, vault) = run("<textarea><!-- keep --><b>x</b><![CDATA[y]]></textarea>");
        assert_eq!(
            body,
            "<textarea><restore count=\"1\" />&lt;b>x&lt;/b><restore count=\"0\" /></textarea>"
        );
        assert_eq!(vault.len(), 2);
    }

    #[test]
    fn test_pre_keeps_vault_markers() {
        let (body, _) = run("<xmp>a<!-- c -->b</xmp>");
        assert_eq!(body, "<pre>a<restore count=\"0\" />b</pre>");
    }

    #[test]
    fn test_xmp_and_plaintext_become_pre() {
        let (body, _) = run("<xmp><b></xmp><p>x</p>");
        assert_eq!(body, "<pre>&lt;b></pre><p>x</p>");

        let (body, _) = run("<p>x</p><plaintext><b>rest\n<i>");
        assert_eq!(body, "<p>x</p><pre>&lt;b>rest\n&lt;i></pre>");
    }

    #[test]
    fn test_removes_declarations_and_prolog() {
        let (body, _) = run(
            "<?xml version=\"1.0\"?><!doctype html><![if !IE]><!ELEMENT x ANY><html><body>ok</body></html>",
        );
        assert_eq!(body, "<html><body>ok</body></html>");
    }

    #[test]
    fn test_non_utf8_bytes_survive() {
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("<p>日本語</p><!-- コメント -->");
        let mut vault = Vault::for_document(&bytes);
        let guarded = guard(&bytes, &mut vault);
        assert_eq!(vault.len(), 1);
        assert!(guarded.ends_with(b"<restore count=\"0\" />"));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(b" \r\n\t"));
        assert!(is_blank(b""));
        assert!(!is_blank(b" x "));
    }
}
