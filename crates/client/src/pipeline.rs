//! Fetch-sanitize-cache orchestration.
//!
//! ### Cache use
//! - Fresh cached entries are returned without touching the network
//! - A conditional request revalidates a cached entry that carries both
//!   `last-modified` and `etag`, sending them as `If-Modified-Since` and
//!   `If-None-Match`
//! - A fetch failure falls back to the cached entry when one is held
//! - A 304 answer reuses the cached entry as-is
//!
//! ### Transformation
//! Status and Content-Type checks, then [`sanitize`], then the
//! [`TolerantParser`] with the XHTML root and namespace forced, then the XHTML
//! prolog. Only successful results are written to the cache.

use crate::document::{StructuredDocument, materialize};
use crate::fetch::{FetchConfig, FetchRequest, FetchResponse, Fetcher, HttpFetcher, is_html_content_type, validate_target};
use crate::sanitize::sanitize;
use crate::xhtml::{Html5everRepair, RepairOptions, TolerantParser, xhtml_prolog};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tidyscrape_core::{AppConfig, CacheDb, ConditionalOutcome, Error, SanitizedDocument, compute_fingerprint};
use tokio::sync::OwnedMutexGuard;

type FetchLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// The document pipeline: fetcher, optional cache and tolerant parser.
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    cache: Option<CacheDb>,
    parser: Arc<dyn TolerantParser>,
    repair: RepairOptions,
    fetch_locks: Option<FetchLocks>,
}

impl Pipeline {
    /// Build the pipeline described by `config`.
    ///
    /// Opens the cache database when caching is enabled and gives garbage
    /// collection its chance to run.
    pub async fn open(config: &AppConfig) -> Result<Self, Error> {
        let fetcher = HttpFetcher::new(FetchConfig::from(config))?;

        let cache = if config.cache_enabled {
            let cache = CacheDb::open(&config.db_path).await?;
            if config.gc_enabled() {
                cache
                    .maybe_collect_garbage(config.gc_max_lifetime_secs, config.gc_divisor)
                    .await?;
            }
            Some(cache)
        } else {
            None
        };

        let pipeline = Self::from_parts(Arc::new(fetcher), cache, Arc::new(Html5everRepair));
        Ok(if config.coalesce_fetches { pipeline.with_fetch_coalescing() } else { pipeline })
    }

    pub fn from_parts(fetcher: Arc<dyn Fetcher>, cache: Option<CacheDb>, parser: Arc<dyn TolerantParser>) -> Self {
        Self { fetcher, cache, parser, repair: RepairOptions::default(), fetch_locks: None }
    }

    /// Serialize requests that share a fingerprint, so concurrent misses
    /// cause one fetch and the waiters read the cached result.
    pub fn with_fetch_coalescing(mut self) -> Self {
        self.fetch_locks = Some(Mutex::new(HashMap::new()));
        self
    }

    pub fn with_repair_options(mut self, options: RepairOptions) -> Self {
        self.repair = options;
        self
    }

    pub fn cache(&self) -> Option<&CacheDb> {
        self.cache.as_ref()
    }

    /// Cache key of a request.
    pub fn fingerprint(&self, request: &FetchRequest) -> Result<String, Error> {
        let url = validate_target(&request.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(compute_fingerprint(&url, &request.headers, &request.post))
    }

    /// Fetch, sanitize and repair a document into well-formed XHTML.
    pub async fn get_xhtml(&self, request: &FetchRequest) -> Result<SanitizedDocument, Error> {
        let fingerprint = self.fingerprint(request)?;
        let cache = self.cache.as_ref().filter(|_| request.cache_lifetime > 0);
        let _guard = match cache {
            Some(_) => self.lock_fingerprint(&fingerprint).await,
            None => None,
        };

        let cached = match cache {
            Some(cache) => cache.get_document(&fingerprint, request.cache_lifetime).await?,
            None => None,
        };

        let revalidate = request.conditional && cached.as_ref().is_some_and(SanitizedDocument::has_validators);
        if let Some(document) = &cached
            && !revalidate
        {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(document.clone());
        }

        let outgoing = with_validators(request, cached.as_ref());
        let response = match self.fetcher.fetch(&outgoing).await {
            Ok(response) => response,
            Err(err) => match cached {
                Some(document) => {
                    tracing::warn!(url = %request.url, error = %err, "fetch failed, serving cached document");
                    return Ok(document);
                }
                None => return Err(err),
            },
        };

        if response.status == 304
            && let Some(document) = cached
        {
            tracing::debug!(url = %request.url, "not modified, reusing cached document");
            return Ok(document);
        }

        let document = self.transform(response)?;

        if let Some(cache) = cache {
            cache.put_document(&fingerprint, &document).await?;
        }

        Ok(document)
    }

    /// [`Pipeline::get_xhtml`] followed by materialization into a tree.
    pub async fn get_document(&self, request: &FetchRequest) -> Result<StructuredDocument, Error> {
        materialize(&self.get_xhtml(request).await?)
    }

    /// Decide how a hosting caller answers a conditional request for
    /// `fingerprint`.
    ///
    /// Without a cache or with a zero lifetime the outcome is
    /// [`ConditionalOutcome::Disabled`].
    pub async fn emulate_conditional_response(
        &self, fingerprint: &str, lifetime_secs: u64, if_modified_since: Option<&str>, if_none_match: Option<&str>,
    ) -> Result<ConditionalOutcome, Error> {
        match &self.cache {
            Some(cache) if lifetime_secs > 0 => {
                cache
                    .conditional_response(fingerprint, lifetime_secs, if_modified_since, if_none_match)
                    .await
            }
            _ => Ok(ConditionalOutcome::Disabled),
        }
    }

    fn transform(&self, response: FetchResponse) -> Result<SanitizedDocument, Error> {
        if response.status != 200 && response.status != 204 {
            return Err(Error::HttpStatus(response.status));
        }
        if let Some(content_type) = response.content_type()
            && !is_html_content_type(content_type)
        {
            return Err(Error::UnsupportedContentType(content_type.to_string()));
        }

        let markup = sanitize(&response.body, response.content_type())?;
        let xhtml = self.parser.repair(&markup, &self.repair)?;

        tracing::debug!(
            url = %response.final_url,
            status = response.status,
            bytes = xhtml.len(),
            "sanitized document"
        );

        Ok(SanitizedDocument {
            url: response.final_url,
            code: response.status,
            headers: response.headers,
            body: format!("{}{}", xhtml_prolog(), xhtml),
        })
    }

    async fn lock_fingerprint(&self, fingerprint: &str) -> Option<OwnedMutexGuard<()>> {
        let locks = self.fetch_locks.as_ref()?;
        let lock = {
            let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(fingerprint.to_string()).or_default())
        };
        Some(lock.lock_owned().await)
    }
}

/// The request with the cached validators carried into the outgoing
/// revalidation headers, unless the caller already set them.
fn with_validators(request: &FetchRequest, cached: Option<&SanitizedDocument>) -> FetchRequest {
    let mut outgoing = request.clone();
    let Some(cached) = cached else {
        return outgoing;
    };

    for (header, value) in [("if-modified-since", cached.last_modified()), ("if-none-match", cached.etag())] {
        if let Some(value) = value
            && outgoing.headers.get(header).is_none_or(String::is_empty)
        {
            outgoing.headers.insert(header.to_string(), value.to_string());
        }
    }
    outgoing
}
