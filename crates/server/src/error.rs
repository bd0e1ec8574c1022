//! Structured errors for the tidyscrape server.
//!
//! Pipeline failures arrive as `tidyscrape_core::Error`; these cover the
//! checks the tool layer performs itself.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors raised by the tool layer before the pipeline runs.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid tool arguments (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A cache tool was called while caching is disabled.
    #[error("CACHE_DISABLED: caching is disabled in the server configuration")]
    CacheDisabled,
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::InvalidInput(_) => -32602,
            ServerError::CacheDisabled => -32010,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_to_mcp_error() {
        let err: McpError = ServerError::InvalidInput("url cannot be empty".into()).into();
        assert_eq!(err.code.0, -32602);
        assert_eq!(err.message, "INVALID_INPUT: url cannot be empty");

        let err: McpError = ServerError::CacheDisabled.into();
        assert_eq!(err.code.0, -32010);
    }
}
