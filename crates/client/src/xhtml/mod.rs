//! Tolerant-parse backend: near-valid markup in, well-formed XHTML out.
//!
//! The pipeline only depends on [`TolerantParser`]; [`Html5everRepair`] is the
//! default implementation, built on the html5ever tree builder that `scraper`
//! wraps.

mod repair;
mod serialize;

pub use self::repair::Html5everRepair;

use tidyscrape_core::Error;

/// XHTML namespace injected on the root element by default.
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

const XHTML_PROLOG: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "#,
    r#""http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">"#,
);

/// XML declaration and XHTML 1.0 Transitional DOCTYPE prepended to every document.
pub fn xhtml_prolog() -> &'static str {
    XHTML_PROLOG
}

/// How the repaired document is shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOptions {
    /// Name of the forced root element.
    pub root: String,
    /// Default namespace declared on the root, if any.
    pub namespace: Option<String>,
    /// Element that receives inline content orphaned directly under the root.
    pub generic_parent: String,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self { root: "html".to_string(), namespace: Some(XHTML_NAMESPACE.to_string()), generic_parent: "body".to_string() }
    }
}

/// Accepts near-valid markup and returns strictly well-formed XHTML
/// (without XML declaration or DOCTYPE).
pub trait TolerantParser: Send + Sync {
    fn repair(&self, markup: &str, options: &RepairOptions) -> Result<String, Error>;
}
