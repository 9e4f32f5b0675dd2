//! Image collection and linked-vector rasterisation.
//!
//! After extraction every `<img>` in the article gets an absolute `src`
//! (lazy-loading attributes win over placeholder sources), the content images
//! are collected in document order without duplicates, and linked `.svg`
//! files are fetched and rasterised so the saved folder holds PNGs.

use crate::config::ConversionConfig;
use crate::dom::{Document, NodeId};
use crate::error::ItemError;
use crate::pipeline::naming::UrlMap;
use crate::pipeline::{encode, input, vector};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use url::Url;

/// Raster formats worth saving; anything else is an icon, a tracking pixel
/// or inline data.
pub static RE_RASTER_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|webp|avif)(\?|#|$)").unwrap());
pub static RE_VECTOR_EXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.svg(\?|#|$)").unwrap());

const LAZY_SRC_ATTRS: &[&str] = &["data-src", "data-original", "data-lazy-src"];

/// Whether `src` should be saved locally.
pub fn is_content_image(src: &str, capture_svg: bool) -> bool {
    if encode::is_data_url(src) {
        return false;
    }
    RE_RASTER_EXT.is_match(src) || (capture_svg && RE_VECTOR_EXT.is_match(src))
}

pub fn is_vector_url(src: &str) -> bool {
    !encode::is_data_url(src) && RE_VECTOR_EXT.is_match(src)
}

/// The source a browser would end up showing: a lazy-loading attribute when
/// `src` is missing or an inline placeholder.
fn effective_src(doc: &Document, img: NodeId) -> Option<String> {
    let src = doc.attr(img, "src").map(str::trim).filter(|s| !s.is_empty());
    let placeholder = src.map_or(true, encode::is_data_url);
    if placeholder {
        let lazy = LAZY_SRC_ATTRS
            .iter()
            .find_map(|a| doc.attr(img, a).map(str::trim).filter(|s| !s.is_empty()));
        if let Some(lazy) = lazy {
            return Some(lazy.to_string());
        }
    }
    src.map(str::to_string)
}

/// Rewrite every `img[src]` below `root` to an absolute URL.
pub fn normalize_image_sources(doc: &mut Document, root: NodeId, base: &Url) {
    for img in doc.elements_by_tag(root, &["img"]) {
        let Some(src) = effective_src(doc, img) else {
            continue;
        };
        let absolute = match base.join(&src) {
            Ok(u) => u.to_string(),
            Err(_) => src,
        };
        doc.set_attr(img, "src", absolute);
    }
}

/// Rewrite every `a[href]` below `root` to an absolute URL. In-page
/// fragments stay as they are; `javascript:` links lose their anchor and
/// keep their text.
pub fn normalize_link_targets(doc: &mut Document, root: NodeId, base: &Url) {
    for a in doc.elements_by_tag(root, &["a"]) {
        let Some(href) = doc.attr(a, "href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        if href.starts_with('#') {
            continue;
        }
        if href.get(..11).is_some_and(|p| p.eq_ignore_ascii_case("javascript:")) {
            doc.unwrap(a);
            continue;
        }
        if let Ok(abs) = base.join(href) {
            let abs = abs.to_string();
            doc.set_attr(a, "href", abs);
        }
    }
}

/// Content image sources below `root`, first occurrence first.
pub fn collect_image_urls(doc: &Document, root: NodeId, capture_svg: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    doc.elements_by_tag(root, &["img"])
        .into_iter()
        .filter_map(|img| doc.attr(img, "src"))
        .filter(|src| is_content_image(src, capture_svg))
        .filter(|src| seen.insert(src.to_string()))
        .map(str::to_string)
        .collect()
}

/// Outcome of rasterising the linked vectors of one conversion.
#[derive(Debug, Default)]
pub struct LinkedVectors {
    /// Vector URL → PNG data URL, for the download map.
    pub substitutions: HashMap<String, String>,
    /// Icons and failures: dropped from the map and from the Markdown.
    pub skipped: HashSet<String>,
    pub rasterized: usize,
    pub warnings: Vec<ItemError>,
}

async fn rasterize_linked(url: String, config: &ConversionConfig) -> (String, Result<Option<vector::Raster>, String>) {
    let parsed = match Url::parse(&url) {
        Ok(u) => u,
        Err(e) => return (url, Err(e.to_string())),
    };
    let bytes = match input::fetch_bytes(&parsed, config.fetch_timeout()).await {
        Ok(b) => b,
        Err(e) => return (url, Err(e.to_string())),
    };
    let threshold = config.icon_threshold;
    let max = config.max_raster_dimension;
    let result = tokio::task::spawn_blocking(move || vector::rasterize_document(&bytes, threshold, max))
        .await
        .unwrap_or_else(|e| Err(format!("task panicked: {}", e)));
    (url, result)
}

/// Fetch and rasterise every linked `.svg` in `map`.
///
/// A success renames the entry to `.png` and records a data-URL substitution.
/// Icons and failures are dropped from `map` and listed in
/// [`LinkedVectors::skipped`], so they produce no image at all.
pub async fn rasterize_linked_vectors(map: &mut UrlMap, config: &ConversionConfig) -> LinkedVectors {
    let targets: Vec<String> = map.urls().into_iter().filter(|u| is_vector_url(u)).collect();
    let mut out = LinkedVectors::default();
    if targets.is_empty() {
        return out;
    }
    debug!("Rasterising {} linked vector images", targets.len());

    let results: Vec<_> = stream::iter(targets)
        .map(|url| rasterize_linked(url, config))
        .buffered(config.concurrency)
        .collect()
        .await;

    for (url, result) in results {
        match result {
            Ok(Some(raster)) => {
                map.replace_extension(&url, "png");
                out.substitutions.insert(url, raster.data_url());
                out.rasterized += 1;
            }
            Ok(None) => {
                debug!("Linked vector {} is an icon; skipping", url);
                map.remove(&url);
                out.skipped.insert(url);
            }
            Err(detail) => {
                warn!("Could not rasterise {}: {}", url, detail);
                map.remove(&url);
                out.skipped.insert(url.clone());
                out.warnings.push(ItemError::RasterizeFailed { target: url, detail });
            }
        }
    }
    info!("Rasterised {} linked vector images", out.rasterized);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::naming::build_url_map;

    #[test]
    fn content_image_filter() {
        assert!(is_content_image("https://a/x.JPG", false));
        assert!(is_content_image("https://a/x.png?w=2", false));
        assert!(is_content_image("https://a/x.avif#frag", false));
        assert!(!is_content_image("https://a/x.svg", false));
        assert!(is_content_image("https://a/x.svg", true));
        assert!(!is_content_image("https://a/pixel", true));
        assert!(!is_content_image("data:image/png;base64,AAAA.png", true));
        assert!(!is_content_image("https://a/x.png.html", false));
    }

    #[test]
    fn lazy_sources_and_absolute_urls() {
        let (mut doc, body) = Document::parse_fragment(
            "<img src='data:image/gif;base64,R0lGOD' data-src='/full.jpg'>\
             <img data-original='lazy.png'>\
             <img src='//cdn.example/a.webp'>\
             <img src='rel/b.gif'>",
        );
        let base = Url::parse("https://site.example/post/1").unwrap();
        normalize_image_sources(&mut doc, body, &base);
        let srcs: Vec<_> = doc
            .elements_by_tag(body, &["img"])
            .into_iter()
            .map(|i| doc.attr(i, "src").unwrap().to_string())
            .collect();
        assert_eq!(
            srcs,
            [
                "https://site.example/full.jpg",
                "https://site.example/post/lazy.png",
                "https://cdn.example/a.webp",
                "https://site.example/post/rel/b.gif",
            ]
        );
    }

    #[test]
    fn link_targets_absolute() {
        let (mut doc, body) = Document::parse_fragment(
            "<a href='/about'>About</a> <a href='#notes'>notes</a> <a href='javascript:void(0)'>click</a>",
        );
        let base = Url::parse("https://site.example/post/1").unwrap();
        normalize_link_targets(&mut doc, body, &base);
        let anchors = doc.elements_by_tag(body, &["a"]);
        assert_eq!(anchors.len(), 2);
        assert_eq!(doc.attr(anchors[0], "href"), Some("https://site.example/about"));
        assert_eq!(doc.attr(anchors[1], "href"), Some("#notes"));
        assert!(doc.text_content(body).contains("click"));
    }

    #[test]
    fn collect_dedupes_in_order() {
        let (doc, body) = Document::parse_fragment(
            "<img src='https://a/2.png'><img src='https://a/1.png'><img src='https://a/2.png'>\
             <img src='https://a/icon.svg'><img src='https://a/track'>",
        );
        assert_eq!(collect_image_urls(&doc, body, false), ["https://a/2.png", "https://a/1.png"]);
        assert_eq!(collect_image_urls(&doc, body, true).len(), 3);
    }

    #[tokio::test]
    async fn linked_vectors_renamed_or_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let chart = dir.path().join("chart.svg");
        std::fs::write(&chart, r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100"><rect width="200" height="100"/></svg>"#).unwrap();
        let icon = dir.path().join("icon.svg");
        std::fs::write(&icon, r#"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16"/>"#).unwrap();
        let missing = dir.path().join("missing.svg");

        let urls = [
            Url::from_file_path(&chart).unwrap().to_string(),
            Url::from_file_path(&icon).unwrap().to_string(),
            Url::from_file_path(&missing).unwrap().to_string(),
            "https://a/photo.jpg".to_string(),
        ];
        let mut map = build_url_map(&urls);
        let config = ConversionConfig::default();
        let linked = rasterize_linked_vectors(&mut map, &config).await;

        assert_eq!(linked.rasterized, 1);
        assert_eq!(map.get(&urls[0]), Some("chart.png"));
        assert!(linked.substitutions[&urls[0]].starts_with("data:image/png;base64,"));
        assert!(!map.contains(&urls[1]));
        assert!(!map.contains(&urls[2]));
        assert!(linked.skipped.contains(&urls[1]) && linked.skipped.contains(&urls[2]));
        assert_eq!(linked.skipped.len(), 2);
        assert_eq!(map.get(&urls[3]), Some("photo.jpg"));
        assert!(matches!(linked.warnings[0], ItemError::RasterizeFailed { .. }));
    }
}
