//! Client code for tidyscrape.
//!
//! This crate provides the fetch-sanitize-cache pipeline: HTTP fetch, markup
//! sanitizing, tolerant repair into XHTML, document materialization and URL
//! resolution, shared by the server.

pub mod document;
pub mod fetch;
pub mod pipeline;
pub mod resolve;
pub mod sanitize;
pub mod xhtml;

pub use document::{Element, Node, StructuredDocument, convert_attributes, materialize};
pub use fetch::{FetchConfig, FetchRequest, FetchResponse, Fetcher, HttpFetcher};
pub use pipeline::Pipeline;
pub use resolve::resolve;
pub use sanitize::sanitize;
pub use xhtml::{Html5everRepair, RepairOptions, TolerantParser, xhtml_prolog};
