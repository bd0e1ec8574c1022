//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::cache::{CachePurgeParams, CacheStatsParams, purge_impl, stats_impl};
use crate::tools::xhtml_fetch::{XhtmlFetchParams, xhtml_fetch_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tidyscrape_client::Pipeline;

/// The main MCP server handler for tidyscrape.
#[derive(Clone)]
pub struct TidyscrapeServer {
    pipeline: Arc<Pipeline>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TidyscrapeServer {
    /// Create a new server handler around a shared pipeline.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline, tool_router: Self::tool_router() }
    }

    /// Fetch a URL and return it as well-formed XHTML.
    ///
    /// Scripts and styles are removed, comments and CDATA are kept, the
    /// charset is converted to UTF-8 and a `<base href>` is guaranteed.
    #[tool(
        description = "Fetch an HTML page and return it as well-formed XHTML (UTF-8, scripts removed, <base href> set). Optionally caches, rewrites attributes to absolute URLs and emulates conditional requests."
    )]
    async fn xhtml_fetch(&self, params: Parameters<XhtmlFetchParams>) -> Result<CallToolResult, McpError> {
        xhtml_fetch_impl(&self.pipeline, params.0).await
    }

    /// Delete cache entries older than the given age.
    #[tool(description = "Delete cached documents and conditional metadata older than older_than_secs seconds.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.pipeline, params.0).await
    }

    /// Report cache entry counts.
    #[tool(description = "Count cached documents and conditional metadata records.")]
    async fn cache_stats(&self, params: Parameters<CacheStatsParams>) -> Result<CallToolResult, McpError> {
        stats_impl(&self.pipeline, params.0).await
    }
}

impl ServerHandler for TidyscrapeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tidyscrape".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidyscrape_client::{FetchConfig, Html5everRepair, HttpFetcher};

    #[test]
    fn test_lists_all_tools() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let pipeline = Pipeline::from_parts(Arc::new(fetcher), None, Arc::new(Html5everRepair));
        let server = TidyscrapeServer::new(Arc::new(pipeline));

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["cache_purge", "cache_stats", "xhtml_fetch"]);
        assert_eq!(server.get_info().server_info.name, "tidyscrape");
    }
}
