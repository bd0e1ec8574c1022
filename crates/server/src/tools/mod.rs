//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tidyscrape server.

pub mod cache;
pub mod xhtml_fetch;

pub use xhtml_fetch::{XhtmlFetchOutput, XhtmlFetchParams};

/// Text of the first content block of a tool result.
#[cfg(test)]
pub(crate) fn output_text(result: &rmcp::model::CallToolResult) -> String {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content")
        .to_string()
}
