//! HTML → Markdown rendering.
//!
//! A small Turndown-style renderer: every node is turned into a string from
//! its already-rendered children, block elements are padded with blank
//! lines, and the final cleanup in [`crate::pipeline::postprocess`] collapses
//! the excess. GitHub-flavoured output is built in (tables, `~~strike~~`,
//! task lists).
//!
//! Behaviour for specific elements can be overridden with a [`Rule`]; rules
//! added with [`MarkdownRenderer::with_rule`] are consulted before the
//! built-in ones, most recently added first. [`ImageRule`] is the rule the
//! conversion pipeline installs to point images at the local folder.

use crate::dom::{collapse_whitespace, Document, NodeData, NodeId};
use crate::pipeline::media;
use crate::pipeline::naming::UrlMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// `# Title` or underlined titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadingStyle {
    #[default]
    Atx,
    /// `===`/`---` underlines for `h1`/`h2`; deeper levels stay ATX.
    Setext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeBlockStyle {
    #[default]
    Fenced,
    Indented,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownOptions {
    pub heading_style: HeadingStyle,
    pub code_block_style: CodeBlockStyle,
    /// Bullet for unordered lists.
    pub bullet: char,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            bullet: '-',
        }
    }
}

/// Custom conversion for the elements it matches.
pub trait Rule: Send + Sync {
    fn matches(&self, doc: &Document, node: NodeId) -> bool;

    /// Markdown for `node`; `content` is its rendered children.
    fn replacement(&self, content: &str, doc: &Document, node: NodeId, options: &MarkdownOptions) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    /// Inside a heading or table cell: no line breaks allowed.
    inline: bool,
}

pub struct MarkdownRenderer {
    options: MarkdownOptions,
    rules: Vec<Box<dyn Rule>>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(MarkdownOptions::default())
    }
}

// ── Escaping ─────────────────────────────────────────────────────────────

static ESCAPES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\\", r"\\"),
        (r"\*", r"\*"),
        (r"^-", r"\-"),
        (r"^\+ ", r"\+ "),
        (r"^(=+)", r"\$1"),
        (r"^(#{1,6}) ", r"\$1 "),
        (r"`", r"\`"),
        (r"^~~~", r"\~~~"),
        (r"\[", r"\["),
        (r"\]", r"\]"),
        (r"^>", r"\>"),
        (r"_", r"\_"),
        (r"^(\d+)\. ", r"$1\. "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_BACKTICKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"`+").unwrap());

/// Backslash-escape characters Markdown would otherwise interpret.
pub fn escape(text: &str) -> String {
    ESCAPES
        .iter()
        .fold(text.to_string(), |acc, (re, rep)| re.replace_all(&acc, *rep).into_owned())
}

fn longest_backtick_run(s: &str) -> usize {
    RE_BACKTICKS.find_iter(s).map(|m| m.len()).max().unwrap_or(0)
}

/// Link destination, in angle brackets when it contains whitespace,
/// parentheses or angle brackets.
pub fn link_destination(path: &str) -> String {
    if path.chars().any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>')) {
        format!("<{}>", path.replace('<', "\\<").replace('>', "\\>"))
    } else {
        path.to_string()
    }
}

fn escape_alt(alt: &str) -> String {
    collapse_whitespace(alt).replace('[', "\\[").replace(']', "\\]")
}

/// Append `chunk`. Adjacent blocks share one separator of at most two
/// newlines; spaces that would start a line or double up are dropped.
fn join(out: &mut String, chunk: &str) {
    if chunk.is_empty() {
        return;
    }
    let body = chunk.trim_start_matches('\n');
    let leading = chunk.len() - body.len();
    if leading > 0 {
        let kept = out.trim_end_matches(|c: char| c == '\n' || c == ' ').len();
        let trailing = out[kept..].matches('\n').count();
        out.truncate(kept);
        if !out.is_empty() {
            out.push_str(&"\n".repeat(leading.max(trailing).min(2)));
        }
        out.push_str(body);
    } else if out.is_empty() || out.ends_with('\n') || out.ends_with(' ') {
        out.push_str(chunk.trim_start_matches(' '));
    } else {
        out.push_str(chunk);
    }
}

fn block(content: &str, ctx: Ctx) -> String {
    let content = content.trim_matches(|c: char| c == '\n' || c == ' ');
    if content.is_empty() {
        return String::new();
    }
    if ctx.inline {
        format!(" {} ", content)
    } else {
        format!("\n\n{}\n\n", content)
    }
}

/// `**x**`-style wrapping that keeps surrounding spaces outside the markers.
fn delimit(content: &str, marker: &str) -> String {
    let inner = content.trim();
    if inner.is_empty() {
        return content.to_string();
    }
    let lead = if content.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if content.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{marker}{inner}{marker}{trail}")
}

impl MarkdownRenderer {
    pub fn new(options: MarkdownOptions) -> Self {
        Self {
            options,
            rules: Vec::new(),
        }
    }

    /// Add a rule that takes precedence over the built-in ones and every rule
    /// added before it.
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.insert(0, Box::new(rule));
        self
    }

    pub fn options(&self) -> &MarkdownOptions {
        &self.options
    }

    /// Render the children of `root`.
    pub fn render(&self, doc: &Document, root: NodeId) -> String {
        let out = self.children(doc, root, Ctx::default());
        out.trim_matches(|c: char| c == '\n' || c == ' ').to_string()
    }

    fn children(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        let mut out = String::new();
        for &child in doc.children(id) {
            let chunk = self.node(doc, child, ctx);
            join(&mut out, &chunk);
        }
        out
    }

    fn node(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        match doc.data(id) {
            NodeData::Text(t) => {
                let collapsed = RE_WHITESPACE.replace_all(t, " ");
                escape(&collapsed)
            }
            NodeData::Comment(_) => String::new(),
            NodeData::Document => self.children(doc, id, ctx),
            NodeData::Element(_) => self.element(doc, id, ctx),
        }
    }

    fn element(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        if let Some(rule) = self.rules.iter().find(|r| r.matches(doc, id)) {
            let content = self.children(doc, id, ctx);
            return rule.replacement(&content, doc, id, &self.options);
        }

        let tag = doc.tag(id).unwrap_or("");
        match tag {
            "script" | "style" | "noscript" | "template" | "head" | "title" | "meta" | "link" | "svg" | "iframe"
            | "frame" | "object" | "embed" | "button" | "select" | "textarea" | "colgroup" => String::new(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.heading(doc, id, tag, ctx),
            "br" => {
                if ctx.inline {
                    " ".to_string()
                } else {
                    "  \n".to_string()
                }
            }
            "hr" => {
                if ctx.inline {
                    " ".to_string()
                } else {
                    "\n\n---\n\n".to_string()
                }
            }
            "strong" | "b" => delimit(&self.children(doc, id, ctx), "**"),
            "em" | "i" => delimit(&self.children(doc, id, ctx), "_"),
            "del" | "s" | "strike" => delimit(&self.children(doc, id, ctx), "~~"),
            "code" | "kbd" | "samp" | "tt" => inline_code(&doc.text_content(id)),
            "pre" => self.code_block(doc, id, ctx),
            "a" => self.link(doc, id, ctx),
            "img" => default_image(doc, id),
            "ul" | "ol" => self.list(doc, id, ctx),
            "li" => {
                let prefix = format!("{} ", self.options.bullet);
                self.list_item(doc, id, &prefix, ctx)
            }
            "blockquote" => self.blockquote(doc, id, ctx),
            "table" => self.table(doc, id, ctx),
            "input" => checkbox(doc, id),
            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "figure" | "figcaption"
            | "address" | "details" | "summary" | "dl" | "dd" | "dt" | "body" | "html" | "form" | "fieldset"
            | "center" | "hgroup" | "nav" | "aside" | "caption" => block(&self.children(doc, id, ctx), ctx),
            _ => self.children(doc, id, ctx),
        }
    }

    fn heading(&self, doc: &Document, id: NodeId, tag: &str, ctx: Ctx) -> String {
        let content = self.children(doc, id, Ctx { inline: true });
        let content = collapse_whitespace(&content);
        if content.is_empty() {
            return String::new();
        }
        if ctx.inline {
            return format!(" {} ", content);
        }
        let level = tag[1..].parse::<usize>().unwrap_or(1);
        match (self.options.heading_style, level) {
            (HeadingStyle::Setext, 1 | 2) => {
                let underline = if level == 1 { '=' } else { '-' };
                let width = content.chars().count();
                format!("\n\n{}\n{}\n\n", content, underline.to_string().repeat(width))
            }
            _ => format!("\n\n{} {}\n\n", "#".repeat(level), content),
        }
    }

    fn code_block(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        let mut code = doc.text_content(id);
        if code.ends_with('\n') {
            code.pop();
        }
        if ctx.inline {
            return inline_code(&code);
        }
        match self.options.code_block_style {
            CodeBlockStyle::Indented => {
                let body: Vec<String> = code.lines().map(|l| format!("    {}", l)).collect();
                format!("\n\n{}\n\n", body.join("\n"))
            }
            CodeBlockStyle::Fenced => {
                let language = code_language(doc, id).unwrap_or_default();
                let fence = "`".repeat(longest_backtick_run(&code).max(2) + 1);
                format!("\n\n{fence}{language}\n{code}\n{fence}\n\n")
            }
        }
    }

    fn link(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        let content = self.children(doc, id, ctx);
        let href = doc.attr(id, "href").map(str::trim).unwrap_or("");
        if href.is_empty() || content.trim().is_empty() {
            return content;
        }
        let title = doc
            .attr(id, "title")
            .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
            .unwrap_or_default();
        delimit_link(&content, &link_destination(href), &title)
    }

    fn list(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        let ordered = doc.is(id, "ol");
        let mut number = doc
            .attr(id, "start")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1);
        let mut items = Vec::new();
        for child in doc.element_children(id) {
            if doc.is(child, "li") {
                let prefix = if ordered {
                    format!("{}. ", number)
                } else {
                    format!("{} ", self.options.bullet)
                };
                number += 1;
                items.push(self.list_item(doc, child, &prefix, ctx));
            } else {
                let rendered = self.node(doc, child, ctx);
                let rendered = rendered.trim_matches('\n');
                if !rendered.is_empty() {
                    items.push(rendered.to_string());
                }
            }
        }
        if items.is_empty() {
            return String::new();
        }
        let body = items.join("\n");
        if ctx.inline {
            return format!(" {} ", body.replace('\n', " "));
        }
        if doc.parent(id).is_some_and(|p| doc.is(p, "li")) {
            format!("\n{}\n", body)
        } else {
            format!("\n\n{}\n\n", body)
        }
    }

    fn list_item(&self, doc: &Document, id: NodeId, prefix: &str, ctx: Ctx) -> String {
        let content = self.children(doc, id, ctx);
        let content = content
            .trim_start_matches(|c: char| c == '\n' || c == ' ')
            .trim_end();
        let indent = " ".repeat(prefix.chars().count());
        let body: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 0 || line.is_empty() {
                    line.to_string()
                } else {
                    format!("{}{}", indent, line)
                }
            })
            .collect();
        format!("{}{}", prefix, body.join("\n"))
    }

    fn blockquote(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        let content = self.children(doc, id, ctx);
        let content = content.trim_matches(|c: char| c == '\n' || c == ' ');
        if content.is_empty() {
            return String::new();
        }
        if ctx.inline {
            return format!(" {} ", content);
        }
        let quoted: Vec<String> = content
            .lines()
            .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {}", l) })
            .collect();
        format!("\n\n{}\n\n", quoted.join("\n"))
    }

    fn table(&self, doc: &Document, id: NodeId, ctx: Ctx) -> String {
        let rows: Vec<NodeId> = doc
            .elements_by_tag(id, &["tr"])
            .into_iter()
            .filter(|&tr| doc.ancestors(tr).find(|&a| doc.is(a, "table")) == Some(id))
            .collect();
        if rows.is_empty() || ctx.inline {
            return block(&self.children(doc, id, ctx), ctx);
        }

        let grid: Vec<Vec<String>> = rows
            .iter()
            .map(|&tr| {
                doc.element_children(tr)
                    .into_iter()
                    .filter(|&c| doc.is_any(c, &["td", "th"]))
                    .map(|c| {
                        let text = self.children(doc, c, Ctx { inline: true });
                        collapse_whitespace(&text).replace('|', "\\|")
                    })
                    .collect()
            })
            .collect();
        let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return String::new();
        }

        let header_cells: Vec<NodeId> = doc
            .element_children(rows[0])
            .into_iter()
            .filter(|&c| doc.is_any(c, &["td", "th"]))
            .collect();
        let separator: Vec<String> = (0..columns)
            .map(|i| match header_cells.get(i).and_then(|&c| cell_alignment(doc, c)) {
                Some("left") => ":---".to_string(),
                Some("right") => "---:".to_string(),
                Some("center") => ":---:".to_string(),
                _ => "---".to_string(),
            })
            .collect();

        let render_row = |cells: &[String]| {
            let padded: Vec<&str> = (0..columns)
                .map(|i| cells.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            format!("| {} |", padded.join(" | "))
        };

        let mut lines = Vec::with_capacity(grid.len() + 1);
        lines.push(render_row(&grid[0]));
        lines.push(format!("| {} |", separator.join(" | ")));
        for row in &grid[1..] {
            lines.push(render_row(row));
        }

        let caption = doc
            .element_children(id)
            .into_iter()
            .find(|&c| doc.is(c, "caption"))
            .map(|c| collapse_whitespace(&self.children(doc, c, Ctx { inline: true })))
            .filter(|c| !c.is_empty())
            .map(|c| format!("{}\n\n", c))
            .unwrap_or_default();

        format!("\n\n{}{}\n\n", caption, lines.join("\n"))
    }
}

fn delimit_link(content: &str, destination: &str, title: &str) -> String {
    let inner = content.trim();
    let lead = if content.starts_with(' ') { " " } else { "" };
    let trail = if content.ends_with(' ') { " " } else { "" };
    format!("{lead}[{inner}]({destination}{title}){trail}")
}

fn inline_code(text: &str) -> String {
    let text = text.replace('\n', " ");
    if text.is_empty() {
        return String::new();
    }
    let ticks = "`".repeat(longest_backtick_run(&text) + 1);
    let pad = if text.starts_with('`') || text.ends_with('`') { " " } else { "" };
    format!("{ticks}{pad}{text}{pad}{ticks}")
}

fn code_language(doc: &Document, pre: NodeId) -> Option<String> {
    let code = doc.first_element_child(pre).filter(|&c| doc.is(c, "code"));
    [code, Some(pre)]
        .into_iter()
        .flatten()
        .filter_map(|n| doc.attr(n, "class"))
        .flat_map(str::split_whitespace)
        .find_map(|c| c.strip_prefix("language-").or_else(|| c.strip_prefix("lang-")))
        .map(str::to_string)
}

fn cell_alignment(doc: &Document, cell: NodeId) -> Option<&'static str> {
    let declared = doc
        .attr(cell, "align")
        .map(str::to_string)
        .or_else(|| crate::pipeline::style::inline_property(doc.attr(cell, "style")?, "text-align"))?;
    match declared.trim().to_ascii_lowercase().as_str() {
        "left" => Some("left"),
        "right" => Some("right"),
        "center" => Some("center"),
        _ => None,
    }
}

fn checkbox(doc: &Document, id: NodeId) -> String {
    if !doc.attr(id, "type").is_some_and(|t| t.eq_ignore_ascii_case("checkbox")) {
        return String::new();
    }
    if doc.attr(id, "checked").is_some() {
        "[x] ".to_string()
    } else {
        "[ ] ".to_string()
    }
}

fn default_image(doc: &Document, id: NodeId) -> String {
    let src = doc.attr(id, "src").map(str::trim).unwrap_or("");
    if src.is_empty() {
        return String::new();
    }
    let alt = escape_alt(doc.attr(id, "alt").unwrap_or(""));
    format!("![{}]({})", alt, link_destination(src))
}

// ── Local images ─────────────────────────────────────────────────────────

/// Points images at `./<folder>/<local name>`.
///
/// Mapped sources use their local name. Unmapped sources that still look
/// like content images keep their remote link. Everything else (icons,
/// tracking pixels, inline data, sources passed to [`ImageRule::skip`]) is
/// dropped.
#[derive(Debug, Clone)]
pub struct ImageRule {
    folder: String,
    local_names: HashMap<String, String>,
    skipped: HashSet<String>,
    capture_svg: bool,
}

impl ImageRule {
    pub fn new(folder: impl Into<String>, map: &UrlMap, capture_svg: bool) -> Self {
        Self {
            folder: folder.into(),
            local_names: map.iter().map(|(u, n)| (u.to_string(), n.to_string())).collect(),
            skipped: HashSet::new(),
            capture_svg,
        }
    }

    /// Sources that render to nothing even though they look like content
    /// images: linked vectors found to be icons or that failed to rasterise.
    pub fn skip<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped.extend(urls.into_iter().map(Into::into));
        self
    }
}

impl Rule for ImageRule {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.is(node, "img")
    }

    fn replacement(&self, _content: &str, doc: &Document, node: NodeId, _options: &MarkdownOptions) -> String {
        let src = doc.attr(node, "src").map(str::trim).unwrap_or("");
        let alt = escape_alt(doc.attr(node, "alt").unwrap_or(""));
        if let Some(local) = self.local_names.get(src) {
            let path = format!("./{}/{}", self.folder, local);
            return format!("![{}]({})", alt, link_destination(&path));
        }
        if !self.skipped.contains(src) && media::is_content_image(src, self.capture_svg) {
            return format!("![{}]({})", alt, link_destination(src));
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::naming::build_url_map;

    fn md(html: &str) -> String {
        let (doc, body) = Document::parse_fragment(html);
        MarkdownRenderer::default().render(&doc, body)
    }

    #[test]
    fn headings_and_paragraphs() {
        assert_eq!(md("<h1>Title</h1><p>Hello <b>bold</b> and <em>it</em>.</p>"), "# Title\n\nHello **bold** and _it_.");
        let (doc, body) = Document::parse_fragment("<h2>Sub</h2>");
        let setext = MarkdownRenderer::new(MarkdownOptions {
            heading_style: HeadingStyle::Setext,
            ..MarkdownOptions::default()
        });
        assert_eq!(setext.render(&doc, body), "Sub\n---");
    }

    #[test]
    fn fenced_code_with_language() {
        let out = md("<pre><code class=\"language-rust\">fn main() {}\n</code></pre>");
        assert_eq!(out, "```rust\nfn main() {}\n```");
        assert_eq!(md("<p>use <code>a_b</code></p>"), "use `a_b`");
    }

    #[test]
    fn lists_nested_and_ordered() {
        let out = md("<ul><li>one<ul><li>inner</li></ul></li><li>two</li></ul><ol start=\"3\"><li>x</li><li>y</li></ol>");
        assert_eq!(out, "- one\n  - inner\n- two\n\n3. x\n4. y");
    }

    #[test]
    fn task_list_and_strikethrough() {
        let out = md("<ul><li><input type=\"checkbox\" checked> done</li><li><input type=\"checkbox\"> todo</li></ul><p><del>old</del></p>");
        assert_eq!(out, "- [x] done\n- [ ] todo\n\n~~old~~");
    }

    #[test]
    fn gfm_table() {
        let out = md("<table><tr><th>Name</th><th align=\"right\">Qty</th></tr><tr><td>a|b</td><td>2</td></tr></table>");
        assert_eq!(out, "| Name | Qty |\n| --- | ---: |\n| a\\|b | 2 |");
    }

    #[test]
    fn links_quotes_and_escaping() {
        assert_eq!(md("<p><a href=\"https://x.io/a b\">go</a></p>"), "[go](<https://x.io/a b>)");
        assert_eq!(md("<blockquote><p>a</p><p>b</p></blockquote>"), "> a\n>\n> b");
        assert_eq!(md("<p>2 * 3 = [6]</p>"), "2 \\* 3 = \\[6\\]");
    }

    #[test]
    fn image_rule_three_branches() {
        let map = build_url_map(["https://a/x.png", "https://a/chart (1).jpg"]);
        let (doc, body) = Document::parse_fragment(
            "<p><img src=\"https://a/x.png\" alt=\" A  pic \"></p>\
             <p><img src=\"https://a/chart (1).jpg\" alt=\"c\"></p>\
             <p><img src=\"https://b/other.gif\" alt=\"o\"></p>\
             <p><img src=\"https://b/pixel\" alt=\"t\"></p>",
        );
        let renderer = MarkdownRenderer::default().with_rule(ImageRule::new("My Post", &map, true));
        let out = renderer.render(&doc, body);
        assert_eq!(
            out,
            "![A pic](<./My Post/x.png>)\n\n![c](<./My Post/chart (1).jpg>)\n\n![o](https://b/other.gif)"
        );
    }

    #[test]
    fn skipped_vectors_render_nothing() {
        let map = build_url_map(["https://a/chart.svg"]);
        let (doc, body) = Document::parse_fragment(
            "<p>before</p><p><img src=\"https://a/icon.svg\" alt=\"ico\"></p>\
             <p><img src=\"https://a/broken.svg\" alt=\"b\"></p>\
             <p><img src=\"https://a/other.svg\" alt=\"o\"></p>",
        );
        let rule = ImageRule::new("Post", &map, true).skip(["https://a/icon.svg", "https://a/broken.svg"]);
        let out = MarkdownRenderer::default().with_rule(rule).render(&doc, body);
        assert_eq!(out, "before\n\n![o](https://a/other.svg)");
    }

    #[test]
    fn later_rules_win() {
        struct Shout;
        impl Rule for Shout {
            fn matches(&self, doc: &Document, node: NodeId) -> bool {
                doc.is(node, "p")
            }
            fn replacement(&self, content: &str, _: &Document, _: NodeId, _: &MarkdownOptions) -> String {
                format!("\n\n{}!\n\n", content.to_uppercase())
            }
        }
        let (doc, body) = Document::parse_fragment("<p>hi</p>");
        let out = MarkdownRenderer::default().with_rule(Shout).render(&doc, body);
        assert_eq!(out, "HI!");
    }
}
