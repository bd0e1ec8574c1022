//! cache_purge tool implementation.
//!
//! Runs cache garbage collection on demand.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidyscrape_client::Pipeline;

use super::require_cache;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Delete documents and conditional metadata older than this many seconds.
    /// 0 empties the cache.
    pub older_than_secs: u64,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(pipeline: &Pipeline, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let cache = require_cache(pipeline)?;
    let deleted = cache.collect_garbage(params.older_than_secs).await?;

    let output = CachePurgeOutput { deleted };
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
