//! Conditional-response metadata.
//!
//! Lets the pipeline's own caller answer `If-Modified-Since` / `If-None-Match`
//! requests with 304. One record per fingerprint, created lazily on first
//! access and left untouched while it is younger than the caller's lifetime.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// `{generatedAt, etag}` record for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalMeta {
    /// Unix timestamp (seconds) at which the record was created.
    pub generated_at: i64,
    /// Quoted entity tag.
    pub etag: String,
}

impl ConditionalMeta {
    fn generate(fingerprint: &str, generated_at: i64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update(generated_at.to_string().as_bytes());
        Self { generated_at, etag: format!("\"{}\"", hex::encode(hasher.finalize())) }
    }

    /// `Last-Modified` value in RFC 1123 format.
    pub fn last_modified(&self) -> String {
        let date = Utc.timestamp_opt(self.generated_at, 0).single().unwrap_or_default();
        date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Whether the inbound validators show the caller already holds this version.
    pub fn matches(&self, if_modified_since: Option<&str>, if_none_match: Option<&str>) -> bool {
        let modified_match = if_modified_since
            .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
            .is_some_and(|since| self.generated_at <= since.timestamp());
        let etag_match = if_none_match.is_some_and(|value| value.trim() == self.etag);
        modified_match || etag_match
    }
}

/// Result of emulating a conditional response for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConditionalOutcome {
    /// Caching is disabled; no validators are available.
    Disabled,
    /// The caller should terminate with 304 and send this `Etag`.
    NotModified { etag: String },
    /// The caller should proceed and attach these headers to its own response.
    Proceed { last_modified: String, etag: String },
}

impl CacheDb {
    /// Get the conditional metadata of a fingerprint if younger than `lifetime_secs`.
    pub async fn get_conditional_meta(
        &self, fingerprint: &str, lifetime_secs: u64,
    ) -> Result<Option<ConditionalMeta>, Error> {
        let fingerprint = fingerprint.to_string();
        let oldest = super::cutoff(lifetime_secs);

        self.conn
            .call(move |conn| -> Result<Option<ConditionalMeta>, Error> {
                let result = conn.query_row(
                    "SELECT generated_at, etag FROM conditional_meta WHERE fingerprint = ?1 AND generated_at >= ?2",
                    params![fingerprint, oldest],
                    |row| Ok(ConditionalMeta { generated_at: row.get(0)?, etag: row.get(1)? }),
                );

                match result {
                    Ok(meta) => Ok(Some(meta)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Create (or replace an expired) conditional metadata record stamped now.
    pub async fn create_conditional_meta(&self, fingerprint: &str) -> Result<ConditionalMeta, Error> {
        self.create_conditional_meta_at(fingerprint, Utc::now().timestamp())
            .await
    }

    pub(crate) async fn create_conditional_meta_at(
        &self, fingerprint: &str, generated_at: i64,
    ) -> Result<ConditionalMeta, Error> {
        let meta = ConditionalMeta::generate(fingerprint, generated_at);
        let record = meta.clone();
        let fingerprint = fingerprint.to_string();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO conditional_meta (fingerprint, generated_at, etag)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(fingerprint) DO UPDATE SET
                        generated_at = excluded.generated_at,
                        etag = excluded.etag",
                    params![fingerprint, record.generated_at, record.etag],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(meta)
    }

    /// Decide whether the caller may answer "not modified".
    ///
    /// A valid record that matches either inbound validator yields
    /// [`ConditionalOutcome::NotModified`]. Otherwise the record (created now if
    /// missing or expired) is returned as [`ConditionalOutcome::Proceed`].
    pub async fn conditional_response(
        &self, fingerprint: &str, lifetime_secs: u64, if_modified_since: Option<&str>, if_none_match: Option<&str>,
    ) -> Result<ConditionalOutcome, Error> {
        let meta = match self.get_conditional_meta(fingerprint, lifetime_secs).await? {
            Some(meta) => {
                if meta.matches(if_modified_since, if_none_match) {
                    tracing::debug!(fingerprint, etag = %meta.etag, "conditional request matched");
                    return Ok(ConditionalOutcome::NotModified { etag: meta.etag });
                }
                meta
            }
            None => self.create_conditional_meta(fingerprint).await?,
        };

        Ok(ConditionalOutcome::Proceed { last_modified: meta.last_modified(), etag: meta.etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_modified_format() {
        let meta = ConditionalMeta::generate("fp", 1_704_067_200);
        assert_eq!(meta.last_modified(), "Mon, 01 Jan 2024 00:00:00 GMT");
        assert!(meta.etag.starts_with('"') && meta.etag.ends_with('"'));
    }

    #[test]
    fn test_matches_if_modified_since() {
        let meta = ConditionalMeta::generate("fp", 1_704_067_200);
        assert!(meta.matches(Some("Mon, 01 Jan 2024 00:00:00 GMT"), None));
        assert!(meta.matches(Some("Tue, 02 Jan 2024 00:00:00 GMT"), None));
        assert!(!meta.matches(Some("Sun, 31 Dec 2023 00:00:00 GMT"), None));
        assert!(!meta.matches(Some("not a date"), None));
    }

    #[test]
    fn test_matches_if_none_match() {
        let meta = ConditionalMeta::generate("fp", 1_704_067_200);
        let etag = meta.etag.clone();
        assert!(meta.matches(None, Some(&etag)));
        assert!(!meta.matches(None, Some("\"other\"")));
        assert!(!meta.matches(None, None));
    }

    #[tokio::test]
    async fn test_first_access_creates_record() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_conditional_meta("fp", 60).await.unwrap().is_none());

        let outcome = db.conditional_response("fp", 60, None, None).await.unwrap();
        let stored = db.get_conditional_meta("fp", 60).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            ConditionalOutcome::Proceed { last_modified: stored.last_modified(), etag: stored.etag.clone() }
        );
    }

    #[tokio::test]
    async fn test_record_is_stable_within_lifetime() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = db.conditional_response("fp", 60, None, None).await.unwrap();
        let second = db.conditional_response("fp", 60, None, Some("\"stale\"")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_matching_etag_is_not_modified() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let meta = db.create_conditional_meta("fp").await.unwrap();

        let outcome = db
            .conditional_response("fp", 60, None, Some(&meta.etag))
            .await
            .unwrap();
        assert_eq!(outcome, ConditionalOutcome::NotModified { etag: meta.etag });
    }

    #[tokio::test]
    async fn test_expired_record_is_regenerated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let old = db
            .create_conditional_meta_at("fp", Utc::now().timestamp() - 3600)
            .await
            .unwrap();

        let outcome = db
            .conditional_response("fp", 60, None, Some(&old.etag))
            .await
            .unwrap();
        match outcome {
            ConditionalOutcome::Proceed { etag, .. } => assert_ne!(etag, old.etag),
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_huge_lifetime_keeps_record() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let meta = db.create_conditional_meta_at("fp", 0).await.unwrap();

        let found = db.get_conditional_meta("fp", u64::MAX).await.unwrap();
        assert_eq!(found, Some(meta.clone()));

        let outcome = db
            .conditional_response("fp", u64::MAX, None, Some(&meta.etag))
            .await
            .unwrap();
        assert_eq!(outcome, ConditionalOutcome::NotModified { etag: meta.etag });
    }
}
