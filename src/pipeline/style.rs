//! Minimal CSS cascade for SVG style inlining.
//!
//! A chart styled by a page stylesheet (`.bar { fill: steelblue }`) renders
//! black once its markup is lifted out of the page, because the rasteriser
//! only sees the SVG. [`inline_svg_styles`] resolves the cascaded value of
//! every presentation property in [`SVG_STYLE_PROPS`] and writes it into the
//! element's `style` attribute.
//!
//! Supported selectors: type, `*`, `.class`, `#id`, compounds of those, and
//! the descendant and `>` combinators. Rules using anything else (attribute
//! selectors, pseudo-classes, sibling combinators) are skipped. `@media` and
//! `@supports` blocks are read as if their condition held; other at-rules
//! are ignored.

use crate::dom::{Document, NodeId};
use once_cell::sync::Lazy;
use regex::Regex;

/// Presentation properties copied into inline styles.
pub const SVG_STYLE_PROPS: &[&str] = &[
    "fill",
    "fill-opacity",
    "stroke",
    "stroke-width",
    "stroke-opacity",
    "stroke-dasharray",
    "stroke-linecap",
    "stroke-linejoin",
    "opacity",
    "display",
    "visibility",
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "text-anchor",
    "dominant-baseline",
    "color",
];

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// One `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// Parse a declaration block (`fill: red; stroke: blue !important`).
pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    block
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let property = prop.trim().to_ascii_lowercase();
            let mut value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            let mut important = false;
            if let Some(pos) = value.to_ascii_lowercase().rfind("!important") {
                if value[pos + "!important".len()..].trim().is_empty() {
                    important = true;
                    value = value[..pos].trim_end();
                }
            }
            Some(Declaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

/// Value of `property` in an inline `style` attribute, last one wins.
pub fn inline_property(style: &str, property: &str) -> Option<String> {
    parse_declarations(style)
        .into_iter()
        .filter(|d| d.property == property)
        .last()
        .map(|d| d.value)
}

// ── Selectors ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn parse(token: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let mut rest = token;
        let ident_end = |s: &str| {
            s.find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(s.len())
        };
        if let Some(after) = rest.strip_prefix('*') {
            rest = after;
        } else {
            let end = ident_end(rest);
            if end > 0 {
                compound.tag = Some(rest[..end].to_string());
                rest = &rest[end..];
            }
        }
        while !rest.is_empty() {
            let kind = rest.chars().next()?;
            let tail = &rest[kind.len_utf8()..];
            let end = ident_end(tail);
            if end == 0 {
                return None;
            }
            let name = tail[..end].to_string();
            match kind {
                '.' => compound.classes.push(name),
                '#' => compound.id = Some(name),
                _ => return None,
            }
            rest = &tail[end..];
        }
        Some(compound)
    }

    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(element) = doc.element(id) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if !element.name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(want) = &self.id {
            if element.id() != want {
                return false;
            }
        }
        self.classes.iter().all(|c| element.has_class(c))
    }
}

#[derive(Debug, Clone)]
struct Selector {
    parts: Vec<Compound>,
    /// `combinators[i]` joins `parts[i]` and `parts[i + 1]`.
    combinators: Vec<Combinator>,
    specificity: (u32, u32, u32),
}

impl Selector {
    fn parse(text: &str) -> Option<Self> {
        let spaced = text.replace('>', " > ");
        let mut parts = Vec::new();
        let mut combinators = Vec::new();
        let mut pending = Combinator::Descendant;
        for token in spaced.split_whitespace() {
            if token == ">" {
                if parts.is_empty() {
                    return None;
                }
                pending = Combinator::Child;
                continue;
            }
            let compound = Compound::parse(token)?;
            if !parts.is_empty() {
                combinators.push(pending);
            }
            parts.push(compound);
            pending = Combinator::Descendant;
        }
        if parts.is_empty() || combinators.len() + 1 != parts.len() {
            return None;
        }
        let specificity = parts.iter().fold((0, 0, 0), |(a, b, c), p| {
            (
                a + u32::from(p.id.is_some()),
                b + p.classes.len() as u32,
                c + u32::from(p.tag.is_some()),
            )
        });
        Some(Self {
            parts,
            combinators,
            specificity,
        })
    }

    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let last = self.parts.len() - 1;
        self.parts[last].matches(doc, id) && self.match_prefix(doc, id, last)
    }

    /// `parts[i]` matched `id`; check `parts[..i]` against its ancestors.
    fn match_prefix(&self, doc: &Document, id: NodeId, i: usize) -> bool {
        if i == 0 {
            return true;
        }
        let wanted = &self.parts[i - 1];
        match self.combinators[i - 1] {
            Combinator::Child => doc
                .parent(id)
                .is_some_and(|p| wanted.matches(doc, p) && self.match_prefix(doc, p, i - 1)),
            Combinator::Descendant => doc
                .ancestors(id)
                .any(|a| wanted.matches(doc, a) && self.match_prefix(doc, a, i - 1)),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    order: usize,
    declarations: Vec<Declaration>,
}

/// Rules collected from a document's `<style>` elements.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn parse(css: &str) -> Self {
        let mut sheet = Self::default();
        sheet.push_css(css);
        sheet
    }

    /// Every `<style>` element of `doc`, in document order.
    pub fn from_document(doc: &Document) -> Self {
        let mut sheet = Self::default();
        for style in doc.elements_by_tag(doc.root(), &["style"]) {
            sheet.push_css(&doc.text_content(style));
        }
        sheet
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn push_css(&mut self, css: &str) {
        let css = RE_COMMENT.replace_all(css, "");
        let mut rest: &str = &css;
        while let Some(open) = rest.find('{') {
            // A stray `@import ...;` before this rule ends up in the prelude.
            let prelude = rest[..open].rsplit(';').next().unwrap_or("").trim();
            let Some(len) = block_len(&rest[open..]) else {
                break;
            };
            let body = &rest[open + 1..open + len - 1];
            rest = &rest[open + len..];

            if let Some(at_rule) = prelude.strip_prefix('@') {
                let name = at_rule.split_whitespace().next().unwrap_or("");
                if name.eq_ignore_ascii_case("media") || name.eq_ignore_ascii_case("supports") {
                    self.push_css(body);
                }
                continue;
            }
            let declarations: Vec<Declaration> = parse_declarations(body)
                .into_iter()
                .filter(|d| SVG_STYLE_PROPS.contains(&d.property.as_str()))
                .collect();
            if declarations.is_empty() {
                continue;
            }
            for text in prelude.split(',') {
                if let Some(selector) = Selector::parse(text.trim()) {
                    let order = self.rules.len();
                    self.rules.push(Rule {
                        selector,
                        order,
                        declarations: declarations.clone(),
                    });
                }
            }
        }
    }

    /// Cascaded SVG presentation properties of `id`, in
    /// [`SVG_STYLE_PROPS`] order. Inline `style` beats normal sheet
    /// declarations; `!important` sheet declarations beat inline ones.
    pub fn cascaded(&self, doc: &Document, id: NodeId) -> Vec<(String, String)> {
        // (important, inline, specificity, order)
        type Key = (bool, bool, (u32, u32, u32), usize);
        let mut winners: Vec<Option<(Key, String)>> = vec![None; SVG_STYLE_PROPS.len()];

        let mut offer = |prop: &str, key: Key, value: &str| {
            if let Some(slot) = SVG_STYLE_PROPS.iter().position(|p| *p == prop) {
                let replace = winners[slot].as_ref().is_none_or(|(k, _)| key >= *k);
                if replace {
                    winners[slot] = Some((key, value.to_string()));
                }
            }
        };

        for rule in &self.rules {
            if rule.selector.matches(doc, id) {
                for d in &rule.declarations {
                    offer(&d.property, (d.important, false, rule.selector.specificity, rule.order), &d.value);
                }
            }
        }
        if let Some(style) = doc.attr(id, "style") {
            for (i, d) in parse_declarations(style).iter().enumerate() {
                offer(&d.property, (d.important, true, (0, 0, 0), i), &d.value);
            }
        }

        SVG_STYLE_PROPS
            .iter()
            .zip(winners)
            .filter_map(|(p, w)| w.map(|(_, v)| (p.to_string(), v)))
            .collect()
    }
}

/// Byte length of the `{ … }` block at the start of `s`, braces included.
fn block_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Write the cascaded presentation properties of `svg` and every element
/// below it into their `style` attributes. Existing inline declarations that
/// are not presentation properties are kept.
pub fn inline_svg_styles(doc: &mut Document, svg: NodeId, sheet: &StyleSheet) {
    let mut targets = vec![svg];
    targets.extend(doc.descendant_elements(svg));

    let updates: Vec<(NodeId, String)> = targets
        .into_iter()
        .filter_map(|id| {
            let cascaded = sheet.cascaded(doc, id);
            if cascaded.is_empty() {
                return None;
            }
            let mut parts: Vec<String> = doc
                .attr(id, "style")
                .map(parse_declarations)
                .unwrap_or_default()
                .into_iter()
                .filter(|d| !SVG_STYLE_PROPS.contains(&d.property.as_str()))
                .map(|d| format!("{}: {}", d.property, d.value))
                .collect();
            parts.extend(cascaded.into_iter().map(|(p, v)| format!("{}: {}", p, v)));
            Some((id, parts.join("; ")))
        })
        .collect();

    for (id, style) in updates {
        doc.set_attr(id, "style", style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svg_doc(html: &str) -> (Document, NodeId) {
        let doc = Document::parse(html);
        let svg = doc.first_by_tag(doc.root(), &["svg"]).unwrap();
        (doc, svg)
    }

    #[test]
    fn class_rule_is_inlined() {
        let (mut doc, svg) = svg_doc(
            "<style>.bar { fill: steelblue; cursor: pointer }</style>\
             <svg><rect class='bar'/></svg>",
        );
        let sheet = StyleSheet::from_document(&doc);
        inline_svg_styles(&mut doc, svg, &sheet);
        let rect = doc.first_by_tag(svg, &["rect"]).unwrap();
        assert_eq!(doc.attr(rect, "style"), Some("fill: steelblue"));
    }

    #[test]
    fn specificity_and_order() {
        let (doc, svg) = svg_doc(
            "<style>#c rect { stroke: red } rect { stroke: blue } rect { stroke: green }</style>\
             <svg id='c'><rect/></svg>",
        );
        let sheet = StyleSheet::from_document(&doc);
        let rect = doc.first_by_tag(svg, &["rect"]).unwrap();
        assert_eq!(sheet.cascaded(&doc, rect), vec![("stroke".into(), "red".into())]);
    }

    #[test]
    fn inline_beats_sheet_but_not_important() {
        let (doc, svg) = svg_doc(
            "<style>rect { fill: blue; stroke: black !important }</style>\
             <svg><rect style='fill: red; stroke: white'/></svg>",
        );
        let sheet = StyleSheet::from_document(&doc);
        let rect = doc.first_by_tag(svg, &["rect"]).unwrap();
        let cascaded = sheet.cascaded(&doc, rect);
        assert!(cascaded.contains(&("fill".into(), "red".into())));
        assert!(cascaded.contains(&("stroke".into(), "black".into())));
    }

    #[test]
    fn child_combinator() {
        let (doc, svg) = svg_doc(
            "<style>g > text { font-size: 12px }</style>\
             <svg><g><text>a</text><a><text>b</text></a></g></svg>",
        );
        let sheet = StyleSheet::from_document(&doc);
        let texts = doc.elements_by_tag(svg, &["text"]);
        assert_eq!(sheet.cascaded(&doc, texts[0]).len(), 1);
        assert!(sheet.cascaded(&doc, texts[1]).is_empty());
    }

    #[test]
    fn media_blocks_read_and_unsupported_selectors_skipped() {
        let sheet = StyleSheet::parse(
            "/* theme */ @font-face { font-family: x } \
             @media screen { .a { fill: red } } \
             rect:hover { fill: blue } [data-x] { fill: green }",
        );
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn declarations_parse_important() {
        let decls = parse_declarations("fill: red !important; ; stroke:blue");
        assert_eq!(decls.len(), 2);
        assert!(decls[0].important);
        assert_eq!(decls[0].value, "red");
        assert_eq!(inline_property("display:none; display: block", "display").as_deref(), Some("block"));
    }
}
