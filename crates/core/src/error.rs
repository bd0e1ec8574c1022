//! Unified error types for tidyscrape.
//!
//! Every failure of the fetch-sanitize-cache pipeline surfaces as one of these
//! variants so callers can match on recoverable versus fatal conditions.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the pipeline, the cache and the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty tool arguments).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL is not a fully qualified http(s) URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Transport failure (connect, TLS, timeout, redirect budget).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// The origin answered with a status other than 200, 204 or 304.
    #[error("HTTP_STATUS: responded HTTP status code is {0}")]
    HttpStatus(u16),

    /// The origin answered with a non-(X)HTML Content-Type.
    #[error("UNSUPPORTED_CONTENT_TYPE: responded Content-Type is {0}")]
    UnsupportedContentType(String),

    /// Response body exceeds the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    #[error("EMPTY_BODY: responded entity body is empty")]
    EmptyBody,

    #[error("NO_MARKUP_FOUND: responded entity body does not contain a markup symbol")]
    NoMarkupFound,

    #[error("CONTAINS_NULL: responded entity body contains NULL")]
    ContainsNull,

    /// No character encoding could be determined for the body.
    #[error("ENCODING_DETECTION: {0}")]
    EncodingDetection(String),

    /// The body or a protected fragment could not be converted to UTF-8.
    #[error("ENCODING_CONVERSION: {0}")]
    EncodingConversion(String),

    #[error("EMPTY_AFTER_PREPROCESSING: the entity body became empty after preprocessing")]
    EmptyAfterPreprocessing,

    /// Markup could not be repaired or parsed into a tree.
    #[error("PARSE_FAILURE: {0}")]
    ParseFailure(String),

    /// Cache database operation failed.
    #[error("CACHE_ERROR: {0}")]
    CacheIo(tokio_rusqlite::Error),

    /// Cache payload could not be (de)serialized.
    #[error("CACHE_ERROR: corrupt cache payload: {0}")]
    CorruptPayload(String),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether the failure is caused by the requested document itself
    /// rather than by the infrastructure serving it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::InvalidUrl(_)
                | Error::HttpStatus(_)
                | Error::UnsupportedContentType(_)
                | Error::FetchTooLarge(_)
                | Error::EmptyBody
                | Error::NoMarkupFound
                | Error::ContainsNull
                | Error::EncodingDetection(_)
                | Error::EncodingConversion(_)
                | Error::EmptyAfterPreprocessing
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::CacheIo(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::CacheIo(tokio_rusqlite::Error::Close(c)),
            _ => Error::CacheIo(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::CacheIo(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::CacheIo(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptPayload(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let code = match &err {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => -32602,
            Error::Network(_) => -32003,
            Error::HttpStatus(_) => -32004,
            Error::UnsupportedContentType(_) => -32005,
            Error::FetchTooLarge(_) => -32006,
            Error::EmptyBody | Error::NoMarkupFound | Error::ContainsNull | Error::EmptyAfterPreprocessing => -32007,
            Error::EncodingDetection(_) | Error::EncodingConversion(_) => -32008,
            Error::ParseFailure(_) => -32009,
            Error::CacheIo(_) | Error::CorruptPayload(_) | Error::MigrationFailed(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
