//! XPath-like element selection.
//!
//! Supported: absolute location paths made of `/` (child) and `//`
//! (descendant) steps, name tests or `*`, and `[@attr]` presence predicates,
//! e.g. `//a[@href]`, `/html/head/base`, `//div//img[@src]`.

use super::tree::Element;
use std::collections::HashSet;
use tidyscrape_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    name: String,
    required: Vec<String>,
}

impl Step {
    fn matches(&self, element: &Element) -> bool {
        (self.name == "*" || self.name == element.name)
            && self
                .required
                .iter()
                .all(|attribute| element.attribute(attribute).is_some())
    }
}

fn parse_path(path: &str) -> Result<Vec<Step>, Error> {
    let invalid = |reason: &str| Error::InvalidInput(format!("invalid path '{path}': {reason}"));

    let mut steps = Vec::new();
    let mut rest = path.trim();
    if rest.is_empty() {
        return Err(invalid("empty"));
    }

    while !rest.is_empty() {
        let axis = if let Some(after) = rest.strip_prefix("//") {
            rest = after;
            Axis::Descendant
        } else if let Some(after) = rest.strip_prefix('/') {
            rest = after;
            Axis::Child
        } else {
            return Err(invalid("steps must start with '/' or '//'"));
        };

        let end = rest.find('/').unwrap_or(rest.len());
        let (text, remaining) = rest.split_at(end);
        rest = remaining;

        let name_end = text.find('[').unwrap_or(text.len());
        let (name, mut predicates) = text.split_at(name_end);
        if name.is_empty() {
            return Err(invalid("missing name test"));
        }

        let mut required = Vec::new();
        while !predicates.is_empty() {
            let close = predicates
                .find(']')
                .ok_or_else(|| invalid("unterminated predicate"))?;
            let attribute = predicates[..close]
                .strip_prefix("[@")
                .filter(|a| !a.is_empty())
                .ok_or_else(|| invalid("only [@attr] predicates are supported"))?;
            required.push(attribute.to_string());
            predicates = &predicates[close + 1..];
        }

        steps.push(Step { axis, name: name.to_string(), required });
    }

    Ok(steps)
}

/// Select the elements matching `path`, in document order.
pub fn select<'a>(root: &'a Element, path: &str) -> Result<Vec<&'a Element>, Error> {
    let steps = parse_path(path)?;
    let mut context: Option<Vec<&'a Element>> = None;

    for step in &steps {
        let candidates: Vec<&'a Element> = match (&context, step.axis) {
            (None, Axis::Child) => vec![root],
            (None, Axis::Descendant) => root.descendants_or_self(),
            (Some(nodes), Axis::Child) => nodes.iter().copied().flat_map(Element::child_elements).collect(),
            (Some(nodes), Axis::Descendant) => nodes
                .iter()
                .copied()
                .flat_map(|node| node.child_elements().flat_map(Element::descendants_or_self))
                .collect(),
        };

        let mut seen = HashSet::new();
        context = Some(
            candidates
                .into_iter()
                .filter(|element| step.matches(element))
                .filter(|element| seen.insert(*element as *const Element))
                .collect(),
        );
    }

    Ok(context.unwrap_or_default())
}
