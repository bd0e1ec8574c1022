//! Cache-related MCP tools.
//!
//! This module provides tools for maintaining the SQLite cache.

pub mod purge;
pub mod stats;

pub use purge::{CachePurgeParams, purge_impl};
pub use stats::{CacheStatsParams, stats_impl};

use crate::error::ServerError;
use tidyscrape_client::Pipeline;
use tidyscrape_core::CacheDb;

fn require_cache(pipeline: &Pipeline) -> Result<&CacheDb, ServerError> {
    pipeline.cache().ok_or(ServerError::CacheDisabled)
}
