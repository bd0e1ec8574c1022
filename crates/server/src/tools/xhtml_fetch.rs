//! xhtml_fetch tool implementation.
//!
//! Runs a URL through the full pipeline and returns well-formed XHTML, with
//! optional attribute rewriting and conditional-request emulation.

use std::collections::BTreeMap;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidyscrape_client::{FetchRequest, Pipeline, convert_attributes};
use tidyscrape_core::ConditionalOutcome;

use crate::error::ServerError;

/// Input parameters for xhtml_fetch tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct XhtmlFetchParams {
    /// The URL to fetch.
    pub url: String,

    /// Seconds a cached result stays fresh; 0 (default) disables caching.
    #[serde(default)]
    pub cache_lifetime: u64,

    /// Revalidate a fresh cached result with the origin.
    #[serde(default)]
    pub conditional_request: bool,

    /// Request header overrides.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Form fields; any entry turns the request into a POST.
    #[serde(default)]
    pub post: BTreeMap<String, String>,

    /// Attributes to make absolute, as tag name to attribute name
    /// (e.g. {"a": "href", "img": "src"}). Tag "*" matches every element.
    #[serde(default)]
    pub convert: BTreeMap<String, String>,

    /// Base URL for attribute conversion; defaults to the document's base.
    #[serde(default)]
    pub base_url: Option<String>,

    /// If-Modified-Since value received by the caller.
    #[serde(default)]
    pub if_modified_since: Option<String>,

    /// If-None-Match value received by the caller.
    #[serde(default)]
    pub if_none_match: Option<String>,
}

/// Output structure for xhtml_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct XhtmlFetchOutput {
    /// The original URL requested.
    pub url: String,
    /// True when the caller should answer 304; no document is returned then.
    pub not_modified: bool,
    /// Validators for the caller's own response.
    pub conditional: ConditionalOutcome,
    /// The final URL after redirects.
    pub final_url: Option<String>,
    /// HTTP status the document was built from.
    pub status: Option<u16>,
    /// Base URL of the document.
    pub base_url: Option<String>,
    /// Number of attributes rewritten to absolute URLs.
    pub converted: usize,
    /// The document, XML declaration and DOCTYPE included.
    pub xhtml: Option<String>,
}

/// Implementation of the xhtml_fetch tool.
pub async fn xhtml_fetch_impl(pipeline: &Pipeline, params: XhtmlFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ServerError::InvalidInput("url cannot be empty".into()).into());
    }

    let mut request = FetchRequest::new(params.url.clone())
        .cache_lifetime(params.cache_lifetime)
        .conditional(params.conditional_request);
    for (name, value) in &params.headers {
        request = request.header(name, value.clone());
    }
    request.post = params.post;

    let fingerprint = pipeline.fingerprint(&request)?;
    let conditional = pipeline
        .emulate_conditional_response(
            &fingerprint,
            params.cache_lifetime,
            params.if_modified_since.as_deref(),
            params.if_none_match.as_deref(),
        )
        .await?;

    let mut output = XhtmlFetchOutput {
        url: params.url,
        not_modified: matches!(conditional, ConditionalOutcome::NotModified { .. }),
        conditional,
        final_url: None,
        status: None,
        base_url: None,
        converted: 0,
        xhtml: None,
    };

    if output.not_modified {
        tracing::debug!(url = %output.url, "caller copy is current");
    } else {
        let mut document = pipeline.get_document(&request).await?;
        if !params.convert.is_empty() {
            output.converted = convert_attributes(&mut document, &params.convert, params.base_url.as_deref());
        }

        output.xhtml = Some(document.to_xhtml());
        output.final_url = Some(document.url);
        output.status = Some(document.code);
        output.base_url = Some(document.base_url);
    }

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
