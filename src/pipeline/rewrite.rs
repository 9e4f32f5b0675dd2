//! DOM rewrites around extraction.
//!
//! ```text
//! page clone ──▶ inject_placeholders ──▶ [extract] ──▶ expand_placeholders
//!            ──▶ rasterize_remaining_vectors ──▶ normalize_structure
//! ```
//!
//! ## Why placeholders?
//!
//! Extraction decides what is content by looking at the page, not at frame
//! documents it cannot see. Each captured frame is therefore swapped for a
//! small `<figure>` (an image plus caption) that the extractor keeps or drops
//! like any other figure. Whatever survives is then expanded into the
//! captured frame markup.
//!
//! ## Raster keys
//!
//! Rasterised charts have no remote URL. They are registered in a
//! [`RasterTable`] under `page2md-raster://<n>/chart.png`, a key that flows
//! through image collection and naming like any URL and is swapped for its
//! data URL before downloading.

use crate::dom::{Document, NodeId};
use crate::error::ItemError;
use crate::pipeline::frames::{self, ChartCapture, FrameChannel, CHART_ALT_ATTR, CHART_MARKER_ATTR};
use crate::pipeline::style;
use crate::pipeline::vector::{self, RasterJob};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Attribute marking a frame placeholder with its frame index.
pub const FRAME_MARKER_ATTR: &str = "data-page2md-frame";
pub const RASTER_SCHEME: &str = "page2md-raster";
/// 1×1 transparent GIF.
pub const PLACEHOLDER_GIF: &str = "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

const STRIP_FROM_FRAMES: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "frame", "frameset", "object", "embed", "svg",
];
const TABLE_SECTIONS: &[&str] = &["table", "thead", "tbody", "tfoot", "tr"];
const CELL_BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "blockquote", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5",
    "h6", "pre", "figure",
];

/// Rasterised charts of one conversion, addressed by synthetic keys.
#[derive(Debug, Default, Clone)]
pub struct RasterTable {
    entries: Vec<(String, String)>,
}

impl RasterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a PNG data URL; returns its key.
    pub fn register(&mut self, data_url: String) -> String {
        let key = format!("{}://{}/chart.png", RASTER_SCHEME, self.entries.len());
        self.entries.push((key.clone(), data_url));
        key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn data_url(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Key → data URL, for [`crate::pipeline::naming::remap`].
    pub fn substitutions(&self) -> HashMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

// ── Placeholders ─────────────────────────────────────────────────────────

/// Replace each captured frame element in `doc` with a placeholder figure.
/// Returns how many were injected.
pub fn inject_placeholders(
    doc: &mut Document,
    channels: &[FrameChannel],
    captures: &BTreeMap<usize, ChartCapture>,
) -> usize {
    let mut injected = 0;
    for channel in channels {
        let Some(capture) = captures.get(&channel.frame_index) else {
            continue;
        };
        if !doc.is_attached(channel.node) {
            continue;
        }
        let index = channel.frame_index.to_string();
        let alt = if capture.title.is_empty() { "Embedded chart" } else { capture.title.as_str() };

        let figure = doc.create_element_with("figure", &[(FRAME_MARKER_ATTR, index.as_str())]);
        let img = doc.create_element_with("img", &[("src", PLACEHOLDER_GIF), ("alt", alt)]);
        doc.append_child(figure, img);
        if !capture.title.is_empty() {
            let caption = doc.create_element("figcaption");
            let text = doc.create_text(&capture.title);
            doc.append_child(caption, text);
            doc.append_child(figure, caption);
        }
        doc.replace(channel.node, figure);
        injected += 1;
    }
    debug!("Injected {} frame placeholders", injected);
    injected
}

fn is_hidden(doc: &Document, id: NodeId) -> bool {
    let Some(el) = doc.element(id) else {
        return false;
    };
    let css = el.attr("style").unwrap_or("");
    el.has_attr("hidden")
        || el.attr("aria-hidden") == Some("true")
        || style::inline_property(css, "display").is_some_and(|v| v.eq_ignore_ascii_case("none"))
        || style::inline_property(css, "visibility").is_some_and(|v| v.eq_ignore_ascii_case("hidden"))
}

/// Clean captured frame markup and turn chart markers into images pointing
/// at registered raster keys.
fn prepare_capture(capture: &ChartCapture, table: &mut RasterTable) -> (Document, NodeId, usize) {
    let (mut frag, body) = Document::parse_fragment(&capture.body_html);

    for node in frag.descendant_elements(body) {
        if frag.is_attached(node) && (frag.is_any(node, STRIP_FROM_FRAMES) || is_hidden(&frag, node)) {
            frag.detach(node);
        }
    }
    for img in frag.elements_by_tag(body, &["img"]) {
        frag.detach(img);
    }

    let mut charts = 0;
    for marker in frag.descendant_elements(body) {
        let Some(index) = frag.attr(marker, CHART_MARKER_ATTR) else {
            continue;
        };
        let chart = index
            .parse::<usize>()
            .ok()
            .and_then(|i| capture.rasterized_charts.iter().find(|c| c.index == i));
        let Some(chart) = chart else {
            frag.detach(marker);
            continue;
        };
        let marker_alt = frag.attr(marker, CHART_ALT_ATTR).unwrap_or("").trim();
        let alt = if (marker_alt.is_empty() || marker_alt == "chart") && !capture.title.is_empty() {
            capture.title.clone()
        } else if marker_alt.is_empty() {
            chart.alt.clone()
        } else {
            marker_alt.to_string()
        };
        let key = table.register(chart.data_url.clone());
        let img = frag.create_element_with("img", &[("src", key.as_str()), ("alt", alt.as_str())]);
        frag.replace(marker, img);
        charts += 1;
    }
    (frag, body, charts)
}

/// Expand every surviving placeholder in the article into its frame's
/// captured markup. Returns the number of charts registered.
pub fn expand_placeholders(
    doc: &mut Document,
    root: NodeId,
    captures: &BTreeMap<usize, ChartCapture>,
    table: &mut RasterTable,
) -> usize {
    let mut charts = 0;
    for placeholder in doc.descendant_elements(root) {
        let Some(index) = doc.attr(placeholder, FRAME_MARKER_ATTR) else {
            continue;
        };
        let capture = index.parse::<usize>().ok().and_then(|i| captures.get(&i));
        let Some(capture) = capture else {
            doc.detach(placeholder);
            continue;
        };
        let (frag, body, n) = prepare_capture(capture, table);
        charts += n;

        let container = doc.create_element("div");
        for &child in frag.children(body) {
            let copy = doc.import(&frag, child);
            doc.append_child(container, copy);
        }
        doc.replace(placeholder, container);
        doc.unwrap(container);
        debug!("Expanded frame {} with {} charts", capture.frame_index, n);
    }
    charts
}

// ── Inline vectors ───────────────────────────────────────────────────────

/// Outermost `<svg>` elements below `root`.
pub fn outer_svgs(doc: &Document, root: NodeId) -> Vec<NodeId> {
    doc.elements_by_tag(root, &["svg"])
        .into_iter()
        .filter(|&s| !doc.has_ancestor_tag(s, "svg", 0))
        .collect()
}

/// Inline the cascaded presentation styles of every drawing in `doc`.
pub fn inline_page_styles(doc: &mut Document) {
    let sheet = style::StyleSheet::from_document(doc);
    let root = doc.root();
    for svg in outer_svgs(doc, root) {
        style::inline_svg_styles(doc, svg, &sheet);
    }
}

/// Rasterise the drawings left in the article. Each becomes an `<img>` with
/// a raster key; icons and failures are removed.
pub async fn rasterize_remaining_vectors(
    doc: &mut Document,
    root: NodeId,
    table: &mut RasterTable,
    icon_threshold: f64,
    concurrency: usize,
    max_dim: u32,
) -> (usize, Vec<ItemError>) {
    let mut targets = Vec::new();
    let mut jobs = Vec::new();
    for svg in outer_svgs(doc, root) {
        match RasterJob::inline(doc, svg, icon_threshold) {
            Some(job) => {
                targets.push(svg);
                jobs.push(job);
            }
            None => doc.detach(svg),
        }
    }
    if jobs.is_empty() {
        return (0, Vec::new());
    }

    let results = vector::rasterize_batch(jobs, concurrency, max_dim).await;
    let mut warnings = Vec::new();
    let mut done = 0;
    for (svg, result) in targets.into_iter().zip(results) {
        match result {
            Ok(raster) => {
                let alt = frames::chart_alt(doc, svg);
                let key = table.register(raster.data_url());
                let img = doc.create_element_with("img", &[("src", key.as_str()), ("alt", alt.as_str())]);
                doc.replace(svg, img);
                done += 1;
            }
            Err(e) => {
                doc.detach(svg);
                warnings.push(e);
            }
        }
    }
    info!("Rasterised {} inline vector drawings", done);
    (done, warnings)
}

// ── Structure ────────────────────────────────────────────────────────────

fn is_blank_text(doc: &Document, id: NodeId) -> bool {
    doc.text(id).is_some_and(|t| t.trim().is_empty())
}

/// First `<tr>` of a table, skipping nested tables.
fn first_row(doc: &Document, table: NodeId) -> Option<NodeId> {
    doc.elements_by_tag(table, &["tr"])
        .into_iter()
        .find(|&tr| doc.ancestors(tr).find(|&a| doc.is(a, "table")) == Some(table))
}

/// Tidy tables so they render as GFM tables.
pub fn normalize_structure(doc: &mut Document, root: NodeId) {
    for node in doc.elements_by_tag(root, TABLE_SECTIONS) {
        let blanks: Vec<NodeId> = doc
            .children(node)
            .iter()
            .copied()
            .filter(|&c| is_blank_text(doc, c))
            .collect();
        for b in blanks {
            doc.detach(b);
        }
    }

    for table in doc.elements_by_tag(root, &["table"]) {
        let has_thead = doc.element_children(table).iter().any(|&c| doc.is(c, "thead"));
        if has_thead {
            continue;
        }
        let Some(row) = first_row(doc, table) else {
            continue;
        };
        let cells = doc.element_children(row);
        if cells.iter().any(|&c| doc.is(c, "th")) {
            continue;
        }
        let data_cells: Vec<NodeId> = cells.into_iter().filter(|&c| doc.is(c, "td")).collect();
        for cell in data_cells {
            doc.rename(cell, "th");
        }
    }

    for cell in doc.elements_by_tag(root, &["td", "th"]) {
        for br in doc.elements_by_tag(cell, &["br"]) {
            let space = doc.create_text(" ");
            doc.replace(br, space);
        }
        // Deepest first, so inner wrappers are gone before their parents move.
        for block in doc.elements_by_tag(cell, CELL_BLOCKS).into_iter().rev() {
            let before = doc.create_text(" ");
            let after = doc.create_text(" ");
            doc.insert_before(block, before);
            doc.insert_after(block, after);
            doc.unwrap(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frames::RasterizedChart;

    fn capture(html: &str, charts: usize) -> ChartCapture {
        ChartCapture {
            frame_index: 0,
            title: "Sales by region".into(),
            body_html: html.into(),
            rasterized_charts: (0..charts)
                .map(|i| RasterizedChart {
                    index: i,
                    alt: "chart".into(),
                    data_url: format!("data:image/png;base64,CHART{}", i),
                    width: 300,
                    height: 150,
                })
                .collect(),
        }
    }

    #[test]
    fn raster_keys_are_sequential() {
        let mut t = RasterTable::new();
        assert_eq!(t.register("data:a".into()), "page2md-raster://0/chart.png");
        assert_eq!(t.register("data:b".into()), "page2md-raster://1/chart.png");
        assert_eq!(t.data_url("page2md-raster://1/chart.png"), Some("data:b"));
        assert_eq!(t.substitutions().len(), 2);
    }

    #[test]
    fn expansion_cleans_frame_markup() {
        let (mut doc, body) = Document::parse_fragment(&format!(
            "<p>before</p><figure {}=\"0\"><img src=\"{}\" alt=\"x\"></figure><p>after</p>",
            FRAME_MARKER_ATTR, PLACEHOLDER_GIF
        ));
        let mut captures = BTreeMap::new();
        captures.insert(
            0,
            capture(
                "<h3>Sales</h3><script>evil()</script><style>p{}</style>\
                 <div hidden>secret</div><iframe src='x'></iframe>\
                 <span data-page2md-svg=\"0\" data-page2md-alt=\"chart\"></span>\
                 <svg width='16' height='16'></svg><img src='https://x/logo.png'><p>Source: ACME</p>",
                1,
            ),
        );
        let mut table = RasterTable::new();
        let n = expand_placeholders(&mut doc, body, &captures, &mut table);
        assert_eq!(n, 1);
        let html = doc.inner_html(body);
        assert!(html.starts_with("<p>before</p><h3>Sales</h3>"));
        assert!(html.contains(r#"<img src="page2md-raster://0/chart.png" alt="Sales by region">"#));
        assert!(html.contains("<p>Source: ACME</p><p>after</p>"));
        for gone in ["evil", "secret", "<iframe", "<svg", "logo.png", "<figure"] {
            assert!(!html.contains(gone), "{} should be stripped", gone);
        }
    }

    #[test]
    fn placeholder_without_capture_removed() {
        let (mut doc, body) = Document::parse_fragment("<figure data-page2md-frame=\"3\"><img></figure><p>x</p>");
        let mut table = RasterTable::new();
        expand_placeholders(&mut doc, body, &BTreeMap::new(), &mut table);
        assert_eq!(doc.inner_html(body), "<p>x</p>");
    }

    #[test]
    fn table_first_row_promoted_and_cells_flattened() {
        let (mut doc, body) = Document::parse_fragment(
            "<table>\n  <tr>\n    <td>Name</td>\n    <td>Value</td>\n  </tr>\n  \
             <tr><td><p>a</p><p>b</p></td><td>1<br>2</td></tr>\n</table>",
        );
        normalize_structure(&mut doc, body);
        let ths = doc.elements_by_tag(body, &["th"]);
        assert_eq!(ths.len(), 2);
        let tds = doc.elements_by_tag(body, &["td"]);
        assert_eq!(doc.inner_text(tds[0]), "a b");
        assert_eq!(doc.inner_text(tds[1]), "1 2");
        assert!(doc.elements_by_tag(body, &["p", "br"]).is_empty());
        let tr = doc.elements_by_tag(body, &["tr"])[0];
        assert!(doc.children(tr).iter().all(|&c| doc.is_element(c)));
    }

    #[test]
    fn existing_header_row_left_alone() {
        let (mut doc, body) =
            Document::parse_fragment("<table><thead><tr><td>h</td></tr></thead><tr><td>v</td></tr></table>");
        normalize_structure(&mut doc, body);
        assert!(doc.elements_by_tag(body, &["th"]).is_empty());
    }

    #[tokio::test]
    async fn remaining_vectors_become_keyed_images() {
        let (mut doc, body) = Document::parse_fragment(
            "<p>x</p><svg width='120' height='80' aria-label='Growth'><rect width='10' height='10'/></svg>\
             <svg width='12' height='12'></svg>",
        );
        let mut table = RasterTable::new();
        let (n, warnings) = rasterize_remaining_vectors(&mut doc, body, &mut table, 64.0, 2, 4096).await;
        assert_eq!(n, 1);
        assert!(warnings.is_empty());
        assert_eq!(table.len(), 1);
        let html = doc.inner_html(body);
        assert!(html.contains(r#"<img src="page2md-raster://0/chart.png" alt="Growth">"#));
        assert!(!html.contains("<svg"));
    }
}
