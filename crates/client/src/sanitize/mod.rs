//! Pre-parse sanitization of fetched bodies.
//!
//! Turns raw response bytes into UTF-8 markup that a tolerant parser can
//! repair without losing CDATA sections or comments:
//!
//! 1. Body checks (empty, no start tag, NUL in the first tag)
//! 2. BOM and NUL stripping
//! 3. Markup guard, vaulting CDATA and comments
//! 4. Charset resolution and conversion of body and vault
//! 5. Vault restoration

pub mod charset;
pub mod guard;
pub mod vault;

pub use charset::{Charset, CharsetSource, charset_from_content_type};
pub use vault::{DecodedVault, Vault};

use tidyscrape_core::Error;

/// Sanitize a response body into UTF-8 markup.
pub fn sanitize(body: &[u8], content_type: Option<&str>) -> Result<String, Error> {
    guard::check_body(body)?;
    let body = guard::strip_bom_and_nulls(body);

    let mut vault = Vault::for_document(&body);
    let guarded = guard::guard(&body, &mut vault);
    if guard::is_blank(&guarded) {
        return Err(Error::EmptyAfterPreprocessing);
    }

    let (text, vault) = charset::convert(&guarded, vault, content_type)?;
    Ok(vault.restore_all(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_restores_protected_sections() {
        let body = b"<html><body><script>alert(1)</script><!-- a -- b --><![CDATA[x & y]]><p>ok</p></body></html>";
        let result = sanitize(body, Some("text/html; charset=utf-8")).unwrap();
        assert_eq!(result, "<html><body><!--  a - b  --><![CDATA[x & y]]><p>ok</p></body></html>");
    }

    #[test]
    fn test_sanitize_restores_comment_inside_textarea() {
        let body = b"<p>x</p><textarea><!-- keep --></textarea><xmp><![CDATA[y]]></xmp>";
        let result = sanitize(body, Some("text/html; charset=utf-8")).unwrap();
        assert_eq!(result, "<p>x</p><textarea><!--  keep  --></textarea><pre><![CDATA[y]]></pre>");
        assert!(!result.contains("&lt;restore"));
    }

    #[test]
    fn test_sanitize_empty_after_preprocessing() {
        let body = b"<script>only()</script>\n<style>p{}</style>";
        assert!(matches!(sanitize(body, None), Err(Error::EmptyAfterPreprocessing)));
    }

    #[test]
    fn test_sanitize_shift_jis() {
        let (body, _, _) = encoding_rs::SHIFT_JIS.encode("<p>こんにちは</p><!-- 世界 -->");
        let result = sanitize(&body, Some("text/html; charset=Shift_JIS")).unwrap();
        assert_eq!(result, "<p>こんにちは</p><!--  世界  -->");
    }

    #[test]
    fn test_sanitize_rejects_bad_bodies() {
        assert!(matches!(sanitize(b"", None), Err(Error::EmptyBody)));
        assert!(matches!(sanitize(b"plain text", None), Err(Error::NoMarkupFound)));
    }
}
