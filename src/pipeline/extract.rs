//! Article extraction.
//!
//! [`Extractor`] is the seam: given the working copy of a page it returns the
//! main content as a self-contained [`Article`], or `None` when the page has
//! nothing that looks like an article.
//!
//! The built-in [`ReadabilityExtractor`] hands the page to `dom_smoothie`,
//! a port of Mozilla's Readability. The page is serialised, the library
//! scores and cleans it, and the article markup it returns is parsed back
//! into a [`Document`] so the rest of the pipeline keeps working on the
//! arena DOM. Structural chrome (`nav`, `aside`, `footer`) is removed before
//! the hand-off, whatever the scoring would have made of it.

use crate::dom::{Document, NodeId};
use dom_smoothie::{Config, Readability};
use tracing::debug;
use url::Url;

const CHROME: &[&str] = &["nav", "aside", "footer"];

/// Main content of a page plus its metadata.
#[derive(Debug, Clone)]
pub struct Article {
    pub title: String,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
    pub site_name: Option<String>,
    /// Standalone document holding the extracted markup.
    pub content: Document,
    /// Wrapper element under which the extracted nodes live.
    pub root: NodeId,
}

impl Article {
    pub fn html(&self) -> String {
        self.content.inner_html(self.root)
    }

    /// Length in characters of the visible text.
    pub fn text_len(&self) -> usize {
        self.content.inner_text(self.root).chars().count()
    }
}

/// Finds the main content of a page.
pub trait Extractor: Send + Sync {
    /// Extract the article from `doc`. `url` is the page's address.
    fn extract(&self, doc: &Document, url: &Url) -> Option<Article>;
}

/// Readability content extractor backed by `dom_smoothie`.
#[derive(Debug, Clone)]
pub struct ReadabilityExtractor {
    char_threshold: usize,
}

impl Default for ReadabilityExtractor {
    fn default() -> Self {
        Self { char_threshold: 500 }
    }
}

impl ReadabilityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum text length an attempt must reach before looser passes stop
    /// being tried.
    pub fn char_threshold(mut self, n: usize) -> Self {
        self.char_threshold = n;
        self
    }

    fn config(&self) -> Config {
        Config {
            char_threshold: self.char_threshold,
            // Code fences read their language from `class`.
            keep_classes: true,
            ..Config::default()
        }
    }
}

/// Serialise `doc` without its structural chrome.
fn prepared_html(doc: &Document) -> String {
    let mut work = doc.clone();
    let root = work.root();
    for node in work.elements_by_tag(root, CHROME) {
        work.detach(node);
    }
    work.outer_html(root)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Extractor for ReadabilityExtractor {
    fn extract(&self, doc: &Document, url: &Url) -> Option<Article> {
        let html = prepared_html(doc);
        let mut readability = match Readability::new(html, Some(url.as_str()), Some(self.config())) {
            Ok(r) => r,
            Err(e) => {
                debug!("Readability rejected {}: {}", url, e);
                return None;
            }
        };
        let parsed = match readability.parse() {
            Ok(a) => a,
            Err(e) => {
                debug!("No article found in {}: {}", url, e);
                return None;
            }
        };

        let (content, root) = Document::parse_fragment(&parsed.content.to_string());
        let has_media = !content.elements_by_tag(root, &["img", "svg"]).is_empty();
        if content.inner_text(root).is_empty() && !has_media {
            debug!("Extracted article of {} is empty", url);
            return None;
        }

        let title = non_empty(Some(parsed.title))
            .or_else(|| doc.title())
            .unwrap_or_default();
        debug!("Extracted '{}' from {}", title, url);

        Some(Article {
            title,
            byline: non_empty(parsed.byline),
            excerpt: non_empty(parsed.excerpt),
            site_name: non_empty(parsed.site_name),
            content,
            root,
        })
    }
}
