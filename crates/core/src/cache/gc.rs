//! Cache garbage collection and statistics.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Entry counts per cache table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    pub documents: u64,
    pub conditional: u64,
}

impl CacheDb {
    /// Delete every document and conditional record at least `max_lifetime_secs` old.
    ///
    /// Returns the total number of deleted entries.
    pub async fn collect_garbage(&self, max_lifetime_secs: u64) -> Result<u64, Error> {
        let oldest = super::cutoff(max_lifetime_secs);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let documents = tx.execute("DELETE FROM documents WHERE stored_at <= ?1", params![oldest])?;
                let conditional = tx.execute("DELETE FROM conditional_meta WHERE generated_at <= ?1", params![oldest])?;
                tx.commit()?;
                Ok((documents + conditional) as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Run [`CacheDb::collect_garbage`] with probability `1 / divisor`.
    ///
    /// A divisor of zero disables collection. Returns the number of deleted
    /// entries, or None when this call did not trigger a collection.
    pub async fn maybe_collect_garbage(&self, max_lifetime_secs: u64, divisor: u32) -> Result<Option<u64>, Error> {
        if divisor == 0 || rand::thread_rng().gen_range(1..=divisor) != 1 {
            return Ok(None);
        }

        let deleted = self.collect_garbage(max_lifetime_secs).await?;
        tracing::info!(deleted, max_lifetime_secs, "cache garbage collected");
        Ok(Some(deleted))
    }

    pub async fn stats(&self) -> Result<CacheStats, Error> {
        self.conn
            .call(|conn| -> Result<CacheStats, Error> {
                let documents: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
                let conditional: i64 = conn.query_row("SELECT COUNT(*) FROM conditional_meta", [], |row| row.get(0))?;
                Ok(CacheStats { documents: documents as u64, conditional: conditional as u64 })
            })
            .await
            .map_err(Error::from)
    }
}
