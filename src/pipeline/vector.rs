//! Vector → raster conversion for charts and diagrams.
//!
//! ## Sizing policy
//!
//! A drawing's size comes from its `width`/`height` attributes (read the way
//! a browser's `parseFloat` would, so `"400px"` is 400), falling back per
//! axis to the `viewBox`, and finally to the HTML default of 300 × 150.
//!
//! The icon filter only fires when **both** dimensions are known and either
//! is below the threshold: a 32 × 32 logo is decoration, but a chart whose
//! size is set by CSS (no attributes at all) is content of unknown size and
//! is rendered at the default instead of being dropped.
//!
//! ## Why `spawn_blocking`?
//!
//! `resvg` is CPU-bound and synchronous. A page with a dozen charts would
//! otherwise stall the runtime that is also waiting on frame responses and
//! image downloads. Batches run on the blocking pool, bounded by
//! `concurrency`, and results come back in input order.

use crate::dom::{Document, NodeId};
use crate::error::ItemError;
use crate::pipeline::encode;
use futures::stream::{self, StreamExt};
use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_WIDTH: f64 = 300.0;
pub const DEFAULT_HEIGHT: f64 = 150.0;

/// System fonts, loaded once per process; chart labels need them.
static FONT_DB: Lazy<Arc<fontdb::Database>> = Lazy::new(|| {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    debug!("Loaded {} font faces for SVG text", db.len());
    Arc::new(db)
});

/// Leading decimal number of `s`, like JavaScript's `parseFloat`.
/// Zero, negative and unparsable values count as absent.
fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return None;
    }
    let mut exp_end = end;
    if exp_end < bytes.len() && (bytes[exp_end] == b'e' || bytes[exp_end] == b'E') {
        exp_end += 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Declared size of a drawing; `None` means unknown on that axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgDimensions {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// What to do with a drawing of a given size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VectorSize {
    /// Both dimensions known and at least one below the icon threshold.
    Icon,
    /// Render at this size; missing axes were filled with the defaults.
    Render { width: f64, height: f64 },
}

impl SvgDimensions {
    pub fn from_attrs(width: Option<&str>, height: Option<&str>, view_box: Option<&str>) -> Self {
        let mut w = width.and_then(leading_float);
        let mut h = height.and_then(leading_float);
        if let Some(vb) = view_box {
            if w.is_none() || h.is_none() {
                let parts: Vec<&str> = vb
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|p| !p.is_empty())
                    .collect();
                w = w.or_else(|| parts.get(2).and_then(|p| leading_float(p)));
                h = h.or_else(|| parts.get(3).and_then(|p| leading_float(p)));
            }
        }
        Self { width: w, height: h }
    }

    /// Dimensions of an `<svg>` element.
    pub fn of(doc: &Document, svg: NodeId) -> Self {
        Self::from_attrs(
            doc.attr(svg, "width"),
            doc.attr(svg, "height"),
            doc.attr(svg, "viewBox").or_else(|| doc.attr(svg, "viewbox")),
        )
    }

    pub fn classify(&self, icon_threshold: f64) -> VectorSize {
        if let (Some(w), Some(h)) = (self.width, self.height) {
            if w < icon_threshold || h < icon_threshold {
                return VectorSize::Icon;
            }
        }
        VectorSize::Render {
            width: self.width.unwrap_or(DEFAULT_WIDTH),
            height: self.height.unwrap_or(DEFAULT_HEIGHT),
        }
    }
}

/// Pixel size for a drawing, with the longest edge capped at `max_dim`.
pub fn raster_size(width: f64, height: f64, max_dim: u32) -> (u32, u32) {
    let max = f64::from(max_dim.max(1));
    let longest = width.max(height);
    let scale = if longest > max { max / longest } else { 1.0 };
    let w = (width * scale).round().clamp(1.0, max) as u32;
    let h = (height * scale).round().clamp(1.0, max) as u32;
    (w, h)
}

/// A PNG produced from a drawing.
#[derive(Debug, Clone)]
pub struct Raster {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Raster {
    /// `data:image/png;base64,…` identifier of this raster.
    pub fn data_url(&self) -> String {
        encode::to_data_url("image/png", &self.png)
    }
}

/// Render SVG markup at `width × height` (capped at `max_dim`) to PNG.
pub fn rasterize(svg: &[u8], width: f64, height: f64, max_dim: u32) -> Result<Raster, String> {
    let options = usvg::Options {
        fontdb: Arc::clone(&FONT_DB),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_data(svg, &options).map_err(|e| format!("SVG parsing error: {}", e))?;

    let (w, h) = raster_size(width, height, max_dim);
    let mut pixmap = Pixmap::new(w, h).ok_or_else(|| format!("Unable to create {}x{} pixel buffer", w, h))?;

    let size = tree.size();
    let transform = Transform::from_scale(w as f32 / size.width(), h as f32 / size.height());
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut img = RgbaImage::new(w, h);
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let png = encode::encode_png(&img).map_err(|e| format!("PNG encoding error: {}", e))?;
    Ok(Raster { png, width: w, height: h })
}

/// One drawing to rasterise.
#[derive(Debug, Clone)]
pub struct RasterJob {
    /// Human-readable origin for error reports (`svg #3`, a URL, …).
    pub label: String,
    pub svg: String,
    pub width: f64,
    pub height: f64,
}

impl RasterJob {
    /// Job for an inline `<svg>`, or `None` if the icon filter skips it.
    /// Styles should already be inlined.
    pub fn inline(doc: &Document, svg: NodeId, icon_threshold: f64) -> Option<Self> {
        match SvgDimensions::of(doc, svg).classify(icon_threshold) {
            VectorSize::Icon => None,
            VectorSize::Render { width, height } => Some(Self {
                label: format!("inline svg {}", svg),
                svg: doc.to_xml(svg),
                width,
                height,
            }),
        }
    }
}

/// Rasterise all jobs, at most `concurrency` at a time, and return the
/// results in input order. One failure never affects the others.
pub async fn rasterize_batch(
    jobs: Vec<RasterJob>,
    concurrency: usize,
    max_dim: u32,
) -> Vec<Result<Raster, ItemError>> {
    stream::iter(jobs.into_iter().map(|job| async move {
        let RasterJob { label, svg, width, height } = job;
        tokio::task::spawn_blocking(move || rasterize(svg.as_bytes(), width, height, max_dim))
            .await
            .map_err(|e| format!("rasterisation task panicked: {}", e))
            .and_then(|r| r)
            .map_err(|detail| ItemError::RasterizeFailed { target: label, detail })
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}

/// Rasterise a linked `.svg` document. `Ok(None)` means the icon filter
/// skipped it.
pub fn rasterize_document(bytes: &[u8], icon_threshold: f64, max_dim: u32) -> Result<Option<Raster>, String> {
    let text = String::from_utf8_lossy(bytes);
    let doc = Document::parse(&text);
    let svg = doc
        .first_by_tag(doc.root(), &["svg"])
        .ok_or_else(|| "no <svg> root element".to_string())?;
    match SvgDimensions::of(&doc, svg).classify(icon_threshold) {
        VectorSize::Icon => Ok(None),
        VectorSize::Render { width, height } => rasterize(bytes, width, height, max_dim).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(w: Option<&str>, h: Option<&str>, vb: Option<&str>) -> SvgDimensions {
        SvgDimensions::from_attrs(w, h, vb)
    }

    #[test]
    fn explicit_attributes() {
        assert_eq!(
            dims(Some("800"), Some("600"), None).classify(64.0),
            VectorSize::Render { width: 800.0, height: 600.0 }
        );
        assert_eq!(dims(Some("400px"), Some("300.5"), None).width, Some(400.0));
    }

    #[test]
    fn view_box_fills_missing_axes() {
        assert_eq!(dims(None, None, Some("0 0 400 300")), dims(Some("400"), Some("300"), None));
        let d = dims(Some("800"), None, Some("0 0 400 300"));
        assert_eq!((d.width, d.height), (Some(800.0), Some(300.0)));
        let d = dims(None, Some("600"), Some("0 0 400 300"));
        assert_eq!((d.width, d.height), (Some(400.0), Some(600.0)));
        let d = dims(None, None, Some("0,0,500,400"));
        assert_eq!((d.width, d.height), (Some(500.0), Some(400.0)));
    }

    #[test]
    fn icon_filter() {
        assert_eq!(dims(Some("32"), Some("32"), None).classify(64.0), VectorSize::Icon);
        assert_eq!(dims(Some("16"), Some("300"), None).classify(64.0), VectorSize::Icon);
        assert_eq!(dims(Some("300"), Some("16"), None).classify(64.0), VectorSize::Icon);
        assert_eq!(
            dims(Some("64"), Some("64"), None).classify(64.0),
            VectorSize::Render { width: 64.0, height: 64.0 }
        );
    }

    #[test]
    fn unknown_size_uses_default() {
        assert_eq!(
            dims(None, None, None).classify(64.0),
            VectorSize::Render { width: 300.0, height: 150.0 }
        );
        assert_eq!(
            dims(Some("auto"), Some("100%"), None).classify(64.0),
            VectorSize::Render { width: 300.0, height: 100.0 }
        );
    }

    #[test]
    fn raster_size_caps_longest_edge() {
        assert_eq!(raster_size(800.0, 600.0, 4096), (800, 600));
        assert_eq!(raster_size(20000.0, 10000.0, 4096), (4096, 2048));
        assert_eq!(raster_size(0.2, 0.2, 4096), (1, 1));
    }

    #[test]
    fn rasterizes_simple_chart() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="80"><rect width="100" height="80" fill="red"/></svg>"#;
        let raster = rasterize(svg, 100.0, 80.0, 4096).unwrap();
        assert_eq!((raster.width, raster.height), (100, 80));
        let img = image::load_from_memory(&raster.png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(50, 40), &Rgba([255, 0, 0, 255]));
        assert!(raster.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn broken_markup_is_an_error() {
        assert!(rasterize(b"<svg", 100.0, 100.0, 4096).is_err());
    }

    #[tokio::test]
    async fn batch_keeps_order_and_isolates_failures() {
        let good = r#"<svg xmlns="http://www.w3.org/2000/svg" width="70" height="70"/>"#;
        let jobs = vec![
            RasterJob { label: "a".into(), svg: good.into(), width: 70.0, height: 70.0 },
            RasterJob { label: "b".into(), svg: "not svg".into(), width: 70.0, height: 70.0 },
            RasterJob { label: "c".into(), svg: good.into(), width: 90.0, height: 70.0 },
        ];
        let results = rasterize_batch(jobs, 2, 4096).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(&results[1], Err(ItemError::RasterizeFailed { target, .. }) if target == "b"));
        assert_eq!(results[2].as_ref().unwrap().width, 90);
    }

    #[test]
    fn linked_icon_skipped() {
        let icon = br#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24"/>"#;
        assert!(rasterize_document(icon, 64.0, 4096).unwrap().is_none());
        let chart = br#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100"/>"#;
        let raster = rasterize_document(chart, 64.0, 4096).unwrap().unwrap();
        assert_eq!((raster.width, raster.height), (200, 100));
    }
}
