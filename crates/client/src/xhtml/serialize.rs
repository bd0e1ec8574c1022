//! XHTML serialization of an html5ever tree.

use super::RepairOptions;
use super::repair::CdataStash;
use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Serialize the document element of `html` as XHTML.
pub(super) fn write_document(html: &Html, options: &RepairOptions, cdata: &CdataStash) -> String {
    let mut writer = XhtmlWriter { cdata, out: String::new() };
    writer.root(html.root_element(), options);
    writer.out
}

struct XhtmlWriter<'a> {
    cdata: &'a CdataStash,
    out: String,
}

impl XhtmlWriter<'_> {
    fn root(&mut self, html: ElementRef<'_>, options: &RepairOptions) {
        self.out.push('<');
        self.out.push_str(&options.root);
        if let Some(namespace) = &options.namespace {
            self.out.push_str(" xmlns=\"");
            self.out.push_str(&escape_attribute(namespace));
            self.out.push('"');
        }
        self.attributes(html);
        self.out.push('>');

        for child in html.children() {
            match child.value() {
                Node::Text(text) if !text.trim().is_empty() => {
                    self.open(&options.generic_parent);
                    self.out.push_str(&escape_text(&self.cdata.restore_in(text)));
                    self.close(&options.generic_parent);
                }
                _ => self.node(child),
            }
        }

        self.close(&options.root);
    }

    fn node(&mut self, node: NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.out.push_str(&escape_text(&self.cdata.restore_in(text))),
            Node::Comment(comment) => self.comment(comment),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.element(element);
                }
            }
            _ => {}
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if !is_xml_name(name) {
            for child in element.children() {
                self.node(child);
            }
            return;
        }

        self.out.push('<');
        self.out.push_str(name);
        self.attributes(element);

        if VOID_ELEMENTS.contains(&name) && !element.has_children() {
            self.out.push_str(" />");
            return;
        }

        self.out.push('>');
        for child in element.children() {
            self.node(child);
        }
        self.close(name);
    }

    fn attributes(&mut self, element: ElementRef<'_>) {
        let mut seen: Vec<&str> = Vec::new();
        for (name, value) in element.value().attrs() {
            if !is_xml_name(name) || name == "xmlns" || seen.contains(&name) {
                continue;
            }
            seen.push(name);
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attribute(&self.cdata.restore_in(value)));
            self.out.push('"');
        }
    }

    fn comment(&mut self, data: &str) {
        if let Some(section) = self.cdata.lookup(data) {
            self.out.push_str(&strip_illegal(section));
            return;
        }

        if let Some(inner) = data.strip_prefix("[CDATA[").and_then(|d| d.strip_suffix("]]")) {
            self.out.push_str("<![CDATA[");
            self.out.push_str(&strip_illegal(&inner.replace("]]>", "]]&gt;")));
            self.out.push_str("]]>");
            return;
        }

        self.out.push_str("<!--");
        self.out.push_str(&comment_text(data));
        self.out.push_str("-->");
    }

    fn open(&mut self, name: &str) {
        self.out.push('<');
        self.out.push_str(name);
        self.out.push('>');
    }

    fn close(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }
}

/// XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// Unprefixed XML name; names with a colon are rejected since their prefix is never declared.
pub(super) fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_') && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn strip_illegal(text: &str) -> String {
    text.chars().filter(|&c| is_xml_char(c)).collect()
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars().filter(|&c| is_xml_char(c)) {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Comment data must not contain `--` nor end with `-`.
fn comment_text(data: &str) -> String {
    let mut text = String::with_capacity(data.len());
    for c in data.chars().filter(|&c| is_xml_char(c)) {
        if c == '-' && text.ends_with('-') {
            continue;
        }
        text.push(c);
    }
    if text.ends_with('-') {
        text.push(' ');
    }
    text
}
