//! Sanitized document cache operations.
//!
//! Each entry holds the full response record of one fingerprint (final URL,
//! status, headers and the sanitized XHTML body) serialized as JSON.
//! Freshness is decided at read time against the caller's cache lifetime.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A sanitized response record, as produced by the pipeline and stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SanitizedDocument {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status code of the response the body was built from.
    pub code: u16,
    /// Response headers with lower-cased keys.
    pub headers: BTreeMap<String, String>,
    /// Well-formed XHTML, starting with the XML declaration and DOCTYPE.
    pub body: String,
}

impl SanitizedDocument {
    /// Look up a response header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    /// Whether the record carries both validators needed for revalidation.
    pub fn has_validators(&self) -> bool {
        self.last_modified().is_some() && self.etag().is_some()
    }
}

impl CacheDb {
    /// Store a document under its fingerprint, replacing any previous entry.
    pub async fn put_document(&self, fingerprint: &str, document: &SanitizedDocument) -> Result<(), Error> {
        self.put_document_at(fingerprint, document, Utc::now().timestamp())
            .await
    }

    pub(crate) async fn put_document_at(
        &self, fingerprint: &str, document: &SanitizedDocument, stored_at: i64,
    ) -> Result<(), Error> {
        let fingerprint = fingerprint.to_string();
        let url = document.url.clone();
        let payload = serde_json::to_string(document)?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO documents (fingerprint, url, payload_json, stored_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(fingerprint) DO UPDATE SET
                        url = excluded.url,
                        payload_json = excluded.payload_json,
                        stored_at = excluded.stored_at",
                    params![fingerprint, url, payload, stored_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a document stored no longer than `lifetime_secs` ago.
    ///
    /// Returns None if the fingerprint is unknown or the entry is older than the lifetime.
    pub async fn get_document(&self, fingerprint: &str, lifetime_secs: u64) -> Result<Option<SanitizedDocument>, Error> {
        let fingerprint = fingerprint.to_string();
        let oldest = super::cutoff(lifetime_secs);

        let payload = self
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT payload_json FROM documents WHERE fingerprint = ?1 AND stored_at >= ?2",
                    params![fingerprint, oldest],
                    |row| row.get(0),
                );

                match result {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Delete the document stored under a fingerprint.
    ///
    /// Returns whether an entry was removed.
    pub async fn delete_document(&self, fingerprint: &str) -> Result<bool, Error> {
        let fingerprint = fingerprint.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM documents WHERE fingerprint = ?1", params![fingerprint])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_document(url: &str) -> SanitizedDocument {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html; charset=UTF-8".to_string());
        SanitizedDocument {
            url: url.to_string(),
            code: 200,
            headers,
            body: "<?xml version=\"1.0\" encoding=\"UTF-8\"?><html><body>ok</body></html>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let document = make_document("https://example.com/");

        db.put_document("fp1", &document).await.unwrap();

        let retrieved = db.get_document("fp1", 60).await.unwrap().unwrap();
        assert_eq!(retrieved, document);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_document("nonexistent", 60).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_expired_is_miss() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let stale = Utc::now().timestamp() - 120;
        db.put_document_at("fp1", &make_document("https://example.com/"), stale)
            .await
            .unwrap();

        assert!(db.get_document("fp1", 60).await.unwrap().is_none());
        assert!(db.get_document("fp1", 600).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_huge_lifetime_never_expires() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_document_at("fp1", &make_document("https://example.com/"), 0)
            .await
            .unwrap();

        assert!(db.get_document("fp1", u64::MAX).await.unwrap().is_some());
        assert!(db.get_document("fp1", 1 << 63).await.unwrap().is_some());
        assert!(db.get_document("fp1", i64::MAX as u64).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_replaces_payload() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_document("fp1", &make_document("https://example.com/old"))
            .await
            .unwrap();
        db.put_document("fp1", &make_document("https://example.com/new"))
            .await
            .unwrap();

        let retrieved = db.get_document("fp1", 60).await.unwrap().unwrap();
        assert_eq!(retrieved.url, "https://example.com/new");
    }

    #[tokio::test]
    async fn test_delete_document() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_document("fp1", &make_document("https://example.com/"))
            .await
            .unwrap();

        assert!(db.delete_document("fp1").await.unwrap());
        assert!(!db.delete_document("fp1").await.unwrap());
        assert!(db.get_document("fp1", 60).await.unwrap().is_none());
    }

    #[test]
    fn test_validators() {
        let mut document = make_document("https://example.com/");
        assert!(!document.has_validators());

        document
            .headers
            .insert("last-modified".into(), "Tue, 01 Jan 2024 00:00:00 GMT".into());
        document.headers.insert("etag".into(), "\"abc\"".into());
        assert!(document.has_validators());
        assert_eq!(document.header("ETag"), Some("\"abc\""));
    }
}
