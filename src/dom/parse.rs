//! html5ever front end: parse into an `RcDom`, then copy into the arena.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document as html5_parse, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use super::{Attribute, Document, Element, Namespace, NodeData, NodeId};

pub(super) fn parse_document(html: &str) -> Document {
    let dom = html5_parse(RcDom::default(), ParseOpts::default()).one(html);
    let mut doc = Document::new();
    let root = doc.root();

    // Explicit stack instead of recursion: scraped pages nest deeply.
    let mut stack: Vec<(Handle, NodeId)> = dom
        .document
        .children
        .borrow()
        .iter()
        .rev()
        .map(|c| (c.clone(), root))
        .collect();

    while let Some((handle, parent)) = stack.pop() {
        let data = match &handle.data {
            RcNodeData::Text { contents } => {
                let text = contents.borrow();
                NodeData::Text(String::from(&**text))
            }
            RcNodeData::Comment { contents } => NodeData::Comment(String::from(&**contents)),
            RcNodeData::Element { name, attrs, .. } => NodeData::Element(Element {
                name: name.local.to_string(),
                namespace: Namespace::from_url(&name.ns),
                attrs: attrs
                    .borrow()
                    .iter()
                    .map(|a| Attribute {
                        name: qualified(&a.name),
                        value: String::from(&*a.value),
                    })
                    .collect(),
            }),
            // Doctype and processing instructions carry nothing we render.
            _ => continue,
        };
        let id = doc.push(data);
        doc.append_child(parent, id);
        for child in handle.children.borrow().iter().rev() {
            stack.push((child.clone(), id));
        }
    }

    doc
}

fn qualified(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", &**prefix, &*name.local),
        None => name.local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xlink_prefix_is_kept() {
        let doc = parse_document(r##"<svg><use xlink:href="#a"/></svg>"##);
        let use_el = doc.first_by_tag(doc.root(), &["use"]).unwrap();
        assert_eq!(doc.attr(use_el, "xlink:href"), Some("#a"));
    }

    #[test]
    fn comments_survive() {
        let doc = parse_document("<body><!-- note --><p>x</p></body>");
        let body = doc.body().unwrap();
        assert!(matches!(doc.data(doc.children(body)[0]), NodeData::Comment(c) if c.trim() == "note"));
    }
}
