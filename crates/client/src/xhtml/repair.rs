//! html5ever-backed [`TolerantParser`].

use super::serialize::{is_xml_name, write_document};
use super::{RepairOptions, TolerantParser};
use regex::Regex;
use scraper::Html;
use std::borrow::Cow;
use std::sync::LazyLock;
use tidyscrape_core::Error;

static CDATA_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[.*?\]\]>").expect("CDATA pattern is valid"));

const STASH_KEY: &str = "tidyscrape-cdata";

/// CDATA sections swapped out for keyed comments before parsing.
///
/// The HTML tree builder turns CDATA outside foreign content into a bogus
/// comment that ends at the first `>`; comments survive intact, so sections
/// travel through the parser as `<!--key:N-->` and are written back verbatim.
#[derive(Debug, Default)]
pub(super) struct CdataStash {
    key: String,
    sections: Vec<String>,
}

impl CdataStash {
    fn extract(markup: &str) -> (String, Self) {
        let mut key = STASH_KEY.to_string();
        while markup.contains(&format!("<!--{key}:")) {
            key.push('_');
        }

        let mut stash = Self { key, sections: Vec::new() };
        let replaced = CDATA_SECTION.replace_all(markup, |caps: &regex::Captures| {
            stash.sections.push(caps[0].to_string());
            format!("<!--{}:{}-->", stash.key, stash.sections.len() - 1)
        });

        (replaced.into_owned(), stash)
    }

    /// Original section for a placeholder comment's data.
    pub(super) fn lookup(&self, comment: &str) -> Option<&str> {
        let index: usize = comment.strip_prefix(&self.key)?.strip_prefix(':')?.parse().ok()?;
        self.sections.get(index).map(String::as_str)
    }

    /// Put sections back where a placeholder ended up as character data
    /// (raw-text elements, attribute values).
    pub(super) fn restore_in<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let opening = format!("<!--{}:", self.key);
        if self.sections.is_empty() || !text.contains(&opening) {
            return Cow::Borrowed(text);
        }

        let mut restored = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(&opening) {
            restored.push_str(&rest[..start]);
            let data = &rest[start + "<!--".len()..];
            let section = data
                .find("-->")
                .and_then(|end| self.lookup(&data[..end]).map(|section| (end, section)));
            match section {
                Some((end, section)) => {
                    restored.push_str(section);
                    rest = &data[end + "-->".len()..];
                }
                None => {
                    restored.push_str(&opening);
                    rest = &rest[start + opening.len()..];
                }
            }
        }
        restored.push_str(rest);
        Cow::Owned(restored)
    }
}

/// Repairs markup with html5ever's HTML5 tree-construction rules and writes
/// the result back out as XHTML.
///
/// Missing `<head>`/`<body>` are inserted, unclosed and misnested tags are
/// balanced, void elements are self-closed, names that are not valid XML are
/// dropped (element content is kept).
#[derive(Debug, Clone, Copy, Default)]
pub struct Html5everRepair;

impl TolerantParser for Html5everRepair {
    fn repair(&self, markup: &str, options: &RepairOptions) -> Result<String, Error> {
        if !is_xml_name(&options.root) || !is_xml_name(&options.generic_parent) {
            return Err(Error::ParseFailure(format!(
                "invalid root '{}' or generic parent '{}'",
                options.root, options.generic_parent
            )));
        }

        let (markup, stash) = CdataStash::extract(markup);
        let html = Html::parse_document(&markup);
        if !html.errors.is_empty() {
            tracing::debug!(errors = html.errors.len(), cdata = stash.sections.len(), "repaired markup");
        }

        Ok(write_document(&html, options, &stash))
    }
}
