//! SQLite-backed cache for sanitized documents and conditional metadata.
//!
//! This module provides a persistent cache keyed by request fingerprint using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Fingerprints over URL, header overrides and form fields (SHA-256)
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Probabilistic garbage collection by age

pub mod conditional;
pub mod connection;
pub mod documents;
pub mod fingerprint;
pub mod gc;
pub mod migrations;

pub use crate::Error;

pub use conditional::{ConditionalMeta, ConditionalOutcome};
pub use connection::CacheDb;
pub use documents::SanitizedDocument;
pub use fingerprint::compute_fingerprint;
pub use gc::CacheStats;

/// Unix timestamp `age_secs` seconds ago; ages beyond the clock floor at `i64::MIN`.
pub(crate) fn cutoff(age_secs: u64) -> i64 {
    let age = i64::try_from(age_secs).unwrap_or(i64::MAX);
    chrono::Utc::now().timestamp().saturating_sub(age)
}
