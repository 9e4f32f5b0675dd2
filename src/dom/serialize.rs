//! HTML and XML serialisation of arena subtrees.
//!
//! HTML mode is used for debugging output and frame payloads; XML mode feeds
//! `usvg`, which needs well-formed markup and an explicit SVG namespace.

use super::{Document, NodeData, NodeId, Namespace, SVG_NS, XLINK_NS};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Html,
    Xml,
}

impl Document {
    /// Markup of `id` including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, Mode::Html, false, &mut out);
        out
    }

    /// Markup of `id`'s children.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, Mode::Html, false, &mut out);
        }
        out
    }

    /// Well-formed XML for `id`. The top element of an `<svg>` subtree gets
    /// the SVG (and xlink) namespace declarations if they are missing.
    pub fn to_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, Mode::Xml, true, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, mode: Mode, top: bool, out: &mut String) {
        match self.data(id) {
            NodeData::Document => {
                for &child in self.children(id) {
                    self.write_node(child, mode, false, out);
                }
            }
            NodeData::Text(text) => {
                let raw = mode == Mode::Html
                    && self
                        .parent(id)
                        .and_then(|p| self.tag(p))
                        .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
                if raw {
                    out.push_str(text);
                } else {
                    escape_text(text, out);
                }
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                if mode == Mode::Xml && top && element.name == "svg" {
                    if !element.has_attr("xmlns") {
                        out.push_str(" xmlns=\"");
                        out.push_str(SVG_NS);
                        out.push('"');
                    }
                    if !element.has_attr("xmlns:xlink") {
                        out.push_str(" xmlns:xlink=\"");
                        out.push_str(XLINK_NS);
                        out.push('"');
                    }
                }
                for attr in &element.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    escape_attr(&attr.value, out);
                    out.push('"');
                }
                let children = self.children(id);
                match mode {
                    Mode::Xml if children.is_empty() => {
                        out.push_str("/>");
                        return;
                    }
                    Mode::Html
                        if element.namespace == Namespace::Html
                            && VOID_ELEMENTS.contains(&element.name.as_str()) =>
                    {
                        out.push('>');
                        return;
                    }
                    _ => out.push('>'),
                }
                for &child in children {
                    self.write_node(child, mode, false, out);
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_void_and_raw_text() {
        let doc = Document::parse("<style>p > a {}</style><p>a<br>b &amp; c</p>");
        let body = doc.body().unwrap();
        let html = doc.inner_html(body);
        assert!(html.contains("<p>a<br>b &amp; c</p>"), "{html}");
        let head = doc.head().unwrap();
        assert!(doc.inner_html(head).contains("p > a {}"));
    }

    #[test]
    fn xml_adds_namespace_and_self_closes() {
        let doc = Document::parse(r#"<svg width="10"><rect x="1"/></svg>"#);
        let svg = doc.first_by_tag(doc.root(), &["svg"]).unwrap();
        let xml = doc.to_xml(svg);
        assert!(xml.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg""#), "{xml}");
        assert!(xml.contains(r#"<rect x="1"/>"#), "{xml}");
    }

    #[test]
    fn attribute_quotes_escaped() {
        let (mut doc, body) = Document::parse_fragment("<a>x</a>");
        let a = doc.first_element_child(body).unwrap();
        doc.set_attr(a, "title", "say \"hi\"");
        assert_eq!(doc.outer_html(a), r#"<a title="say &quot;hi&quot;">x</a>"#);
    }
}
