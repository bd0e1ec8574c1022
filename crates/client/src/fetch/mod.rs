//! HTTP fetch stage of the pipeline.
//!
//! ### URL validation
//! - Trim whitespace, unescape `&amp;`
//! - Scheme must be `http`/`https`, host must start with a word character
//!
//! ### Transport
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Default User-Agent unless the request overrides it
//! - Form fields switch the method to POST
//!
//! ### Header observation
//! A 200 response whose Content-Type is present and not (X)HTML is reported
//! as a synthetic 204 and its body is never read.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::{Client, header};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

pub use self::url::{UrlError, has_empty_path, validate_target};

use tidyscrape_core::{AppConfig, Error};

static HTML_CONTENT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:text|application)/x?html\b").expect("content type pattern is valid"));

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const GENERIC_TRANSPORT_ERROR: &str = "Failed connecting to the server.";

/// Whether a Content-Type value denotes HTML or XHTML.
pub fn is_html_content_type(value: &str) -> bool {
    HTML_CONTENT_TYPE.is_match(value.trim())
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string sent when the request does not override it.
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
        }
    }
}

/// A request for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute http(s) URL.
    pub url: String,
    /// Header overrides, keys lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Form fields; any entry makes the request a POST.
    pub post: BTreeMap<String, String>,
    /// Seconds a cached result stays fresh; 0 disables caching for this request.
    pub cache_lifetime: u64,
    /// Revalidate a fresh cached entry with the origin.
    pub conditional: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    /// Add a header override. Keys are case-insensitive.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a form field, forcing a POST.
    pub fn form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.post.insert(name.into(), value.into());
        self
    }

    pub fn cache_lifetime(mut self, seconds: u64) -> Self {
        self.cache_lifetime = seconds;
        self
    }

    pub fn conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    pub fn is_post(&self) -> bool {
        !self.post.is_empty()
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code (204 when a non-HTML body was skipped)
    pub status: u16,
    /// Response headers, keys lower-cased, repeated values joined with `, `
    pub headers: BTreeMap<String, String>,
    /// Response body bytes
    pub body: Bytes,
    /// The final URL after redirects
    pub final_url: String,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Performs the HTTP request/response cycle for the pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the request's URL.
    ///
    /// Transport failures are [`Error::Network`]; any status code is returned
    /// as-is for the caller to judge.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn send(&self, url: &str, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let mut builder = if request.is_post() {
            self.http.post(url).form(&request.post)
        } else {
            self.http.get(url)
        };
        if request.headers.get("accept").is_none_or(String::is_empty) {
            builder = builder.header(header::ACCEPT, ACCEPT);
        }
        for (name, value) in request.headers.iter().filter(|(_, v)| !v.is_empty()) {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());

        if status == 200
            && let Some(content_type) = headers.get("content-type")
            && !is_html_content_type(content_type)
        {
            tracing::debug!(url, content_type = %content_type, "skipping non-HTML body");
            return Ok(FetchResponse {
                status: 204,
                headers,
                body: Bytes::new(),
                final_url,
                fetch_ms: start.elapsed().as_millis() as u64,
            });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let body = response.bytes().await.map_err(transport_error)?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                body.len(),
                self.config.max_bytes
            )));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes, status {})",
            url,
            final_url,
            fetch_ms,
            body.len(),
            status
        );

        Ok(FetchResponse { status, headers, body, final_url, fetch_ms })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let url = validate_target(&request.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let target = url.as_str();
        retry_malformed_once(target, move || self.send(target, request)).await
    }
}

/// Run `send`, repeating it once when an empty-path URL got a malformed response.
async fn retry_malformed_once<F, Fut>(url: &str, mut send: F) -> Result<FetchResponse, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<FetchResponse, Error>>,
{
    match send().await {
        Err(err) if is_malformed_response(&err) && has_empty_path(url) => {
            tracing::warn!(url, error = %err, "malformed response on empty path, retrying once");
            send().await
        }
        result => result,
    }
}

/// Whether a transport failure carries the "malformed response" signature
/// some servers trigger when the request path is empty.
pub fn is_malformed_response(err: &Error) -> bool {
    matches!(err, Error::Network(message) if message.to_ascii_lowercase().contains("malformed"))
}

fn transport_error(err: reqwest::Error) -> Error {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }

    Error::Network(network_message(&parts.join(": ")))
}

fn network_message(message: &str) -> String {
    if message.trim().is_empty() { GENERIC_TRANSPORT_ERROR.to_string() } else { message.to_string() }
}

fn collect_headers(map: &header::HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    headers
}
