//! Placeholder vault for opaque sections (CDATA, comments).
//!
//! Fragments are cut out of the raw body before the later guard stages and
//! before charset conversion, replaced by numbered marker tags, converted
//! together with the body and finally put back in insertion order.

use tidyscrape_core::Error;

const BASE_TAG: &str = "restore";

/// Raw (pre-conversion) fragments of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    tag: String,
    fragments: Vec<Vec<u8>>,
}

impl Vault {
    /// Create an empty vault whose marker tag does not occur in `body`.
    pub fn for_document(body: &[u8]) -> Self {
        let lowered = body.to_ascii_lowercase();
        let tag = std::iter::once(BASE_TAG.to_string())
            .chain((1..).map(|n| format!("{BASE_TAG}{n}")))
            .find(|candidate| !contains(&lowered, format!("<{candidate}").as_bytes()))
            .unwrap_or_else(|| BASE_TAG.to_string());

        Self { tag, fragments: Vec::new() }
    }

    /// Append a fragment, returning its index.
    pub fn store(&mut self, fragment: &[u8]) -> usize {
        self.fragments.push(fragment.to_vec());
        self.fragments.len() - 1
    }

    /// Marker substituted into the body for the fragment at `index`.
    pub fn marker(&self, index: usize) -> String {
        marker(&self.tag, index)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[Vec<u8>] {
        &self.fragments
    }

    /// Convert every fragment with `decode`, the same conversion applied to the body.
    pub fn decode_with<F>(self, mut decode: F) -> Result<DecodedVault, Error>
    where
        F: FnMut(&[u8]) -> Result<String, Error>,
    {
        let fragments = self
            .fragments
            .iter()
            .map(|fragment| decode(fragment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DecodedVault { tag: self.tag, fragments })
    }
}

/// UTF-8 fragments ready to be restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVault {
    tag: String,
    fragments: Vec<String>,
}

impl DecodedVault {
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Replace every marker with its fragment, in ascending index order.
    pub fn restore_all(&self, body: &str) -> String {
        let mut restored = body.to_string();
        for (index, fragment) in self.fragments.iter().enumerate() {
            restored = restored.replace(&marker(&self.tag, index), fragment);
        }
        restored
    }
}

fn marker(tag: &str, index: usize) -> String {
    format!("<{tag} count=\"{index}\" />")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(fragment: &[u8]) -> Result<String, Error> {
        String::from_utf8(fragment.to_vec()).map_err(|e| Error::EncodingConversion(e.to_string()))
    }

    #[test]
    fn test_store_returns_insertion_index() {
        let mut vault = Vault::for_document(b"<p>x</p>");
        assert_eq!(vault.store(b"<!-- a -->"), 0);
        assert_eq!(vault.store(b"<![CDATA[b]]>"), 1);
        assert_eq!(vault.len(), 2);
        assert_eq!(vault.marker(1), "<restore count=\"1\" />");
    }

    #[test]
    fn test_tag_avoids_collision() {
        let vault = Vault::for_document(b"<p><RESTORE count=\"0\" /></p>");
        assert_eq!(vault.tag(), "restore1");

        let vault = Vault::for_document(b"<restore/><restore1/><restore2/>");
        assert_eq!(vault.tag(), "restore3");
    }

    #[test]
    fn test_restore_roundtrip() {
        let mut vault = Vault::for_document(b"");
        let first = vault.store(b"<!-- one -->");
        let second = vault.store(b"<![CDATA[ a < b ]]>");
        let body = format!("<p>{}</p><p>{}</p>", vault.marker(first), vault.marker(second));

        let decoded = vault.decode_with(utf8).unwrap();
        assert_eq!(decoded.restore_all(&body), "<p><!-- one --></p><p><![CDATA[ a < b ]]></p>");
    }

    #[test]
    fn test_restore_marker_ten_after_one() {
        let mut vault = Vault::for_document(b"");
        let mut body = String::new();
        for i in 0..12 {
            let index = vault.store(format!("[{i}]").as_bytes());
            body.push_str(&vault.marker(index));
        }

        let decoded = vault.decode_with(utf8).unwrap();
        assert_eq!(decoded.restore_all(&body), "[0][1][2][3][4][5][6][7][8][9][10][11]");
    }

    #[test]
    fn test_decode_converts_fragments() {
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("<!-- 日本語 -->");
        let mut vault = Vault::for_document(b"");
        vault.store(&bytes);

        let decoded = vault
            .decode_with(|fragment| {
                let (text, _, _) = encoding_rs::SHIFT_JIS.decode(fragment);
                Ok(text.into_owned())
            })
            .unwrap();
        assert_eq!(decoded.fragments(), ["<!-- 日本語 -->".to_string()]);
    }

    #[test]
    fn test_decode_failure_is_conversion_error() {
        let mut vault = Vault::for_document(b"");
        vault.store(&[0xff, 0xfe, 0xfd]);

        let err = vault.decode_with(utf8).unwrap_err();
        assert!(matches!(err, Error::EncodingConversion(_)));
    }
}
