//! Owned XML tree built with quick-xml.
//!
//! Text and attribute values are kept exactly as the materializer's escaped
//! input decodes them, so `&` in the original markup reads as `&amp;` here.
//! [`dump`] reverses that escaping.

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use tidyscrape_core::Error;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

/// An element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), children: Vec::new() }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// This element and every element below it, in document order.
    pub fn descendants_or_self(&self) -> Vec<&Element> {
        let mut found = vec![self];
        for child in self.child_elements() {
            found.extend(child.descendants_or_self());
        }
        found
    }

    /// Apply `f` to this element and every element below it, in document order.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.visit_mut(f);
            }
        }
    }

    /// Concatenated text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Node::Text(value) | Node::CData(value) => text.push_str(value),
                Node::Element(element) => text.push_str(&element.text()),
                Node::Comment(_) => {}
            }
        }
        text
    }
}

/// Parse well-formed XML into a tree rooted at its document element.
///
/// Declarations, DOCTYPE and processing instructions are skipped.
pub fn parse(xml: &str) -> Result<Element, Error> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::ParseFailure(format!("at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => attach(&mut stack, &mut root, Node::Element(element_from(&start)?))?,
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::ParseFailure("unexpected end tag".into()))?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = text.unescape().map_err(|e| Error::ParseFailure(e.to_string()))?;
                    parent.children.push(Node::Text(value.into_owned()));
                }
            }
            Event::CData(cdata) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::CData(String::from_utf8_lossy(&cdata).into_owned()));
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(String::from_utf8_lossy(&comment).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::ParseFailure(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| Error::ParseFailure("no root element".into()))
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, Error> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::ParseFailure(e.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| Error::ParseFailure(e.to_string()))?;
        element
            .attributes
            .push((String::from_utf8_lossy(attribute.key.as_ref()).into_owned(), value.into_owned()));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) -> Result<(), Error> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        Node::Element(element) if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        Node::Element(element) => Err(Error::ParseFailure(format!("second root element <{}>", element.name))),
        _ => Ok(()),
    }
}

/// Serialize an element, turning `&amp;` back into `&`.
pub fn dump(element: &Element) -> String {
    let mut out = String::new();
    write_element(element, &mut out);
    out.replace("&amp;", "&")
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    if element.children.is_empty() && VOID_ELEMENTS.contains(&element.name.as_str()) {
        out.push_str(" />");
        return;
    }

    out.push('>');
    for child in &element.children {
        match child {
            Node::Element(child) => write_element(child, out),
            Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
            Node::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let root = parse("<?xml version=\"1.0\"?><a x=\"1\"><b>t</b><c/><!--n--><![CDATA[d]]></a>").unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attribute("x"), Some("1"));
        assert_eq!(root.children.len(), 4);
        assert_eq!(root.children[2], Node::Comment("n".into()));
        assert_eq!(root.children[3], Node::CData("d".into()));
        assert_eq!(root.text(), "td");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse("<a><b></a>"), Err(Error::ParseFailure(_))));
        assert!(matches!(parse("<a>"), Err(Error::ParseFailure(_))));
        assert!(matches!(parse("text only"), Err(Error::ParseFailure(_))));
        assert!(matches!(parse("<a/><b/>"), Err(Error::ParseFailure(_))));
    }

    #[test]
    fn test_set_attribute_keeps_order() {
        let mut element = Element::new("a");
        element.set_attribute("href", "x");
        element.set_attribute("title", "t");
        element.set_attribute("href", "y");
        assert_eq!(element.attributes, vec![("href".into(), "y".into()), ("title".into(), "t".into())]);
    }

    #[test]
    fn test_dump_reverses_ampersand_escaping() {
        let root = parse("<p title=\"a &amp;amp; b\">x &amp;amp; y &amp;lt;z&amp;gt;<br/></p>").unwrap();
        assert_eq!(root.attribute("title"), Some("a &amp; b"));
        assert_eq!(dump(&root), "<p title=\"a &amp; b\">x &amp; y &lt;z&gt;<br /></p>");
    }

    #[test]
    fn test_dump_keeps_non_void_elements_open() {
        let root = parse("<div><span/><img/></div>").unwrap();
        assert_eq!(dump(&root), "<div><span></span><img /></div>");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<&str> = root
            .descendants_or_self()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }
}
