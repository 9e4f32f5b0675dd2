//! Arena DOM used by every pipeline stage.
//!
//! A page is parsed once with html5ever and copied into a flat arena: every
//! node lives in a `Vec` and is addressed by a [`NodeId`]. Two properties of
//! this layout carry the whole pipeline:
//!
//! * `Document::clone()` is a plain `Vec` copy, and the copy keeps the **same
//!   node ids**. A frame's original `<svg>` (read for its styles) and its
//!   cloned counterpart (replaced by a marker) are therefore the same
//!   `NodeId` in two documents, and the conversion can mutate its own working
//!   copy while the source document stays untouched.
//! * Detaching a node never invalidates other ids. Stages collect the ids
//!   they want to touch first, then mutate, without fighting the borrow
//!   checker over live iterators.
//!
//! Detached nodes stay in the arena until the document is dropped; a
//! document lives for one conversion, so this is never a leak in practice.

mod parse;
mod serialize;

use std::fmt;

/// Index of a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Element namespace as assigned by the HTML tree builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
    Other,
}

pub const HTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

impl Namespace {
    pub fn from_url(url: &str) -> Self {
        match url {
            HTML_NS => Namespace::Html,
            SVG_NS => Namespace::Svg,
            MATHML_NS => Namespace::MathMl,
            _ => Namespace::Other,
        }
    }
}

/// A single attribute. `name` keeps its prefix (`xlink:href`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Local name, lower-case for HTML, case-preserved for SVG (`foreignObject`).
    pub name: String,
    pub namespace: Namespace,
    pub attrs: Vec<Attribute>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Namespace::Html,
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn id(&self) -> &str {
        self.attr("id").unwrap_or("")
    }

    pub fn class_name(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_name().split_ascii_whitespace().any(|c| c == class)
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// An HTML document (or fragment) stored as an arena tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    /// Parse a complete HTML document. Never fails: the HTML5 tree builder
    /// recovers from any input and synthesises `<html>`, `<head>`, `<body>`.
    pub fn parse(html: &str) -> Self {
        parse::parse_document(html)
    }

    /// Parse an HTML fragment; returns the document and the `<body>` that
    /// holds the fragment's top-level nodes.
    pub fn parse_fragment(html: &str) -> (Self, NodeId) {
        let doc = parse::parse_document(html);
        let body = doc.body().unwrap_or_else(|| doc.root());
        (doc, body)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    // ── Read access ───────────────────────────────────────────────────────

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].data, NodeData::Element(_))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Local name of an element node.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// True when `id` is an element with local name `name`.
    pub fn is(&self, id: NodeId, name: &str) -> bool {
        self.tag(id) == Some(name)
    }

    pub fn is_any(&self, id: NodeId, names: &[&str]) -> bool {
        self.tag(id).is_some_and(|t| names.contains(&t))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.is_element(c))
    }

    /// Siblings after `id` under the same parent.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// All descendants of `id` in document (pre-)order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Descendant elements of `id` in document order.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element(n))
            .collect()
    }

    /// Descendant elements whose local name is one of `names`.
    pub fn elements_by_tag(&self, id: NodeId, names: &[&str]) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_any(n, names))
            .collect()
    }

    pub fn first_by_tag(&self, id: NodeId, names: &[&str]) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if self.is_any(next, names) {
                return Some(next);
            }
            stack.extend(self.children(next).iter().rev().copied());
        }
        None
    }

    /// Ancestors of `id`, nearest first, excluding the document node.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// Whether an ancestor within `max_depth` levels (0 = unlimited) has the tag.
    pub fn has_ancestor_tag(&self, id: NodeId, tag: &str, max_depth: usize) -> bool {
        self.ancestors(id)
            .enumerate()
            .take_while(|(depth, _)| max_depth == 0 || *depth < max_depth)
            .any(|(_, a)| self.is(a, tag))
    }

    /// True if `id` is still reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root() {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeData::Text(t) = &self.nodes[id.0].data {
            return t.clone();
        }
        let mut out = String::new();
        for n in self.descendants(id) {
            if let NodeData::Text(t) = &self.nodes[n.0].data {
                out.push_str(t);
            }
        }
        out
    }

    /// Text content with whitespace runs collapsed and ends trimmed.
    pub fn inner_text(&self, id: NodeId) -> String {
        collapse_whitespace(&self.text_content(id))
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.first_element_child(self.root())
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|&c| self.is(c, "body"))
    }

    pub fn head(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|&c| self.is(c, "head"))
    }

    /// Text of the first `<title>` outside of SVG content.
    pub fn title(&self) -> Option<String> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| {
                self.element(n)
                    .is_some_and(|e| e.name == "title" && e.namespace == Namespace::Html)
            })
            .map(|n| self.inner_text(n))
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element(Element::new(name)))
    }

    pub fn create_element_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut element = Element::new(name);
        for (k, v) in attrs {
            element.set_attr(k, *v);
        }
        self.push(NodeData::Element(element))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(e) = self.element_mut(id) {
            e.set_attr(name, value);
        }
    }

    /// Change an element's local name, keeping attributes and children.
    pub fn rename(&mut self, id: NodeId, name: &str) {
        if let Some(e) = self.element_mut(id) {
            e.name = name.to_string();
        }
    }

    /// Remove `id` from its parent. The subtree stays intact and can be
    /// re-inserted elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `node` immediately before `reference`. No-op if `reference`
    /// is detached.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        if reference == node {
            return;
        }
        self.detach(node);
        let Some(parent) = self.nodes[reference.0].parent else {
            return;
        };
        let siblings = &mut self.nodes[parent.0].children;
        let pos = siblings
            .iter()
            .position(|&c| c == reference)
            .unwrap_or(siblings.len());
        siblings.insert(pos, node);
        self.nodes[node.0].parent = Some(parent);
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        match self.next_sibling(reference) {
            Some(next) => self.insert_before(next, node),
            None => {
                if let Some(parent) = self.parent(reference) {
                    self.append_child(parent, node);
                }
            }
        }
    }

    /// Put `new` where `old` is and detach `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        self.insert_before(old, new);
        self.detach(old);
    }

    /// Replace an element by its children.
    pub fn unwrap(&mut self, id: NodeId) {
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.insert_before(id, child);
        }
        self.detach(id);
    }

    /// Move every child of `from` to the end of `to`.
    /// Deep-copy `src` (and its subtree) out of `other` into this document.
    /// The returned node is detached; append it where needed.
    pub fn import(&mut self, other: &Document, src: NodeId) -> NodeId {
        let top = self.push(other.data(src).clone());
        let mut stack: Vec<(NodeId, NodeId)> = other
            .children(src)
            .iter()
            .rev()
            .map(|&c| (c, top))
            .collect();
        while let Some((from, parent)) = stack.pop() {
            let copy = self.push(other.data(from).clone());
            self.append_child(parent, copy);
            stack.extend(other.children(from).iter().rev().map(|&c| (c, copy)));
        }
        top
    }

    /// Parse `html` as a fragment and append its nodes to `parent`.
    pub fn append_html(&mut self, parent: NodeId, html: &str) {
        let (fragment, body) = Document::parse_fragment(html);
        for &child in fragment.children(body) {
            let copy = self.import(&fragment, child);
            self.append_child(parent, copy);
        }
    }
}

/// Iterator returned by [`Document::ancestors`].
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        if cur == self.doc.root() {
            self.next = None;
            return None;
        }
        self.next = self.doc.parent(cur);
        Some(cur)
    }
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_synthesises_body() {
        let doc = Document::parse("<p>hello</p>");
        let body = doc.body().expect("body");
        let p = doc.first_element_child(body).unwrap();
        assert!(doc.is(p, "p"));
        assert_eq!(doc.text_content(p), "hello");
    }

    #[test]
    fn clone_keeps_node_ids() {
        let doc = Document::parse("<div><svg width='10'></svg></div>");
        let svg = doc.first_by_tag(doc.root(), &["svg"]).unwrap();
        let mut copy = doc.clone();
        let marker = copy.create_element("span");
        copy.replace(svg, marker);
        assert!(doc.is(svg, "svg"));
        assert!(doc.is_attached(svg));
        assert!(!copy.is_attached(svg));
        assert_eq!(doc.element(svg).unwrap().namespace, Namespace::Svg);
    }

    #[test]
    fn unwrap_moves_children_in_place() {
        let (mut doc, body) = Document::parse_fragment("<div><b>a</b><i>b</i></div><p>c</p>");
        let div = doc.first_by_tag(body, &["div"]).unwrap();
        doc.unwrap(div);
        let names: Vec<_> = doc
            .element_children(body)
            .into_iter()
            .map(|c| doc.tag(c).unwrap().to_string())
            .collect();
        assert_eq!(names, ["b", "i", "p"]);
    }

    #[test]
    fn import_deep_copies_subtree() {
        let (src, body) = Document::parse_fragment("<ul><li>one</li><li>two</li></ul>");
        let ul = src.first_element_child(body).unwrap();
        let mut dst = Document::new();
        let root = dst.root();
        let copy = dst.import(&src, ul);
        dst.append_child(root, copy);
        assert_eq!(dst.elements_by_tag(root, &["li"]).len(), 2);
        assert_eq!(dst.inner_text(copy), "onetwo");
    }

    #[test]
    fn svg_attributes_keep_case() {
        let doc = Document::parse("<svg viewBox='0 0 10 10'><foreignObject/></svg>");
        let svg = doc.first_by_tag(doc.root(), &["svg"]).unwrap();
        assert_eq!(doc.attr(svg, "viewBox"), Some("0 0 10 10"));
        assert!(doc.first_by_tag(svg, &["foreignObject"]).is_some());
    }

    #[test]
    fn ancestors_stop_at_document() {
        let doc = Document::parse("<table><tr><td><span>x</span></td></tr></table>");
        let span = doc.first_by_tag(doc.root(), &["span"]).unwrap();
        assert!(doc.has_ancestor_tag(span, "table", 0));
        assert!(!doc.has_ancestor_tag(span, "table", 2));
        assert!(doc.ancestors(span).all(|a| a != doc.root()));
    }
}
