//! Structured documents materialized from sanitized XHTML.
//!
//! Materialization strips the default namespace (queries stay unprefixed),
//! escapes every `&` so no entity reference can break the parse, builds an
//! owned tree and makes sure exactly one `<base href>` is present.

mod select;
mod tree;

pub use select::select;
pub use tree::{Element, Node, dump, parse};

use crate::resolve::{is_absolute_base, resolve};
use crate::xhtml::xhtml_prolog;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tidyscrape_core::{Error, SanitizedDocument};

static DEFAULT_NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sxmlns="[^"]+""#).expect("namespace pattern is valid"));

/// Parsed document plus the response metadata it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredDocument {
    pub root: Element,
    /// Absolute base URL: the document's own `<base href>` or the final fetch URL.
    pub base_url: String,
    /// Final URL after redirects.
    pub url: String,
    pub code: u16,
    pub headers: BTreeMap<String, String>,
}

impl StructuredDocument {
    pub fn select(&self, path: &str) -> Result<Vec<&Element>, Error> {
        select(&self.root, path)
    }

    /// XHTML serialization of the whole document, prolog included.
    pub fn to_xhtml(&self) -> String {
        format!("{}{}", xhtml_prolog(), dump(&self.root))
    }
}

/// Parse a sanitized document into a [`StructuredDocument`].
pub fn materialize(document: &SanitizedDocument) -> Result<StructuredDocument, Error> {
    let body = DEFAULT_NAMESPACE.replace_all(&document.body, "");
    let body = body.replace('&', "&amp;");

    let mut root = parse(&body)?;
    let base_url = ensure_base(&mut root, &document.url);

    Ok(StructuredDocument {
        root,
        base_url,
        url: document.url.clone(),
        code: document.code,
        headers: document.headers.clone(),
    })
}

fn is_base(element: &Element) -> bool {
    element.name == "base" && element.attribute("href").is_some()
}

/// Keep the first `<base href>` (made absolute) and drop the rest, or add one
/// under `<head>` pointing at `url`. Returns the base URL.
fn ensure_base(root: &mut Element, url: &str) -> String {
    let existing = root
        .descendants_or_self()
        .into_iter()
        .find(|element| is_base(element))
        .and_then(|element| element.attribute("href"))
        .map(str::to_string);

    if let Some(href) = existing {
        let absolute = resolve(&href, url);
        let mut seen = false;
        keep_first_base(root, &absolute, &mut seen);
        return absolute.replace("&amp;", "&");
    }

    let head = match root
        .children
        .iter()
        .position(|child| matches!(child, Node::Element(e) if e.name == "head"))
    {
        Some(index) => index,
        None => {
            root.children.insert(0, Node::Element(Element::new("head")));
            0
        }
    };

    if let Some(Node::Element(head)) = root.children.get_mut(head) {
        let mut base = Element::new("base");
        base.set_attribute("href", url.replace('&', "&amp;"));
        head.children.push(Node::Element(base));
    }

    url.to_string()
}

fn keep_first_base(element: &mut Element, absolute: &str, seen: &mut bool) {
    let mut index = 0;
    while index < element.children.len() {
        let is_duplicate = match &element.children[index] {
            Node::Element(child) if is_base(child) => *seen,
            _ => false,
        };
        if is_duplicate {
            element.children.remove(index);
            continue;
        }

        if let Node::Element(child) = &mut element.children[index] {
            if is_base(child) {
                *seen = true;
                child.set_attribute("href", absolute);
            }
            keep_first_base(child, absolute, seen);
        }
        index += 1;
    }
}

/// Rewrite the `attribute` of every `tag` element to an absolute URL.
///
/// The base is `base_override` when given, otherwise the document's
/// `<base href>`. Nothing is rewritten unless that base is an absolute http(s)
/// URL. `*` matches every tag. Returns the number of rewritten attributes.
pub fn convert_attributes<I, T, A>(document: &mut StructuredDocument, tags: I, base_override: Option<&str>) -> usize
where
    I: IntoIterator<Item = (T, A)>,
    T: AsRef<str>,
    A: AsRef<str>,
{
    let base = match base_override.filter(|base| !base.is_empty()) {
        Some(base) => base.to_string(),
        None => match document
            .root
            .descendants_or_self()
            .into_iter()
            .find(|element| is_base(element))
            .and_then(|element| element.attribute("href"))
        {
            Some(href) => href.to_string(),
            None => return 0,
        },
    };
    if !is_absolute_base(&base) {
        return 0;
    }

    let mut rewritten = 0;
    for (tag, attribute) in tags {
        let (tag, attribute) = (tag.as_ref(), attribute.as_ref());
        document.root.visit_mut(&mut |element: &mut Element| {
            if tag != "*" && element.name != tag {
                return;
            }
            if let Some(value) = element.attribute(attribute) {
                let absolute = resolve(value, &base);
                element.set_attribute(attribute, absolute);
                rewritten += 1;
            }
        });
    }

    tracing::debug!(rewritten, base = %base, "converted attributes to absolute URLs");
    rewritten
}
