//! cache_stats tool implementation.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidyscrape_client::Pipeline;

use super::require_cache;

/// Parameters for the cache_stats tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsParams {}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(pipeline: &Pipeline, _params: CacheStatsParams) -> Result<CallToolResult, McpError> {
    let stats = require_cache(pipeline)?.stats().await?;

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&stats).unwrap_or_default(),
    )]))
}
