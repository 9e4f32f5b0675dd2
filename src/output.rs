//! Result types produced by a conversion and by Download Dispatch.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage. Reported to the progress callback on every transition.
///
/// ```text
/// Idle → CapturingFrames → Extracting → ExpandingPlaceholders
///      → RasterizingVectors → NormalizingStructure → CollectingMedia
///      → EmittingMarkdown → Done
///                 Extracting → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    CapturingFrames,
    Extracting,
    ExpandingPlaceholders,
    RasterizingVectors,
    NormalizingStructure,
    CollectingMedia,
    EmittingMarkdown,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::CapturingFrames => "capturing-frames",
            Stage::Extracting => "extracting",
            Stage::ExpandingPlaceholders => "expanding-placeholders",
            Stage::RasterizingVectors => "rasterizing-remaining-vectors",
            Stage::NormalizingStructure => "normalizing-structure",
            Stage::CollectingMedia => "collecting-media",
            Stage::EmittingMarkdown => "emitting-markdown",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata reported by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub title: String,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
    pub site_name: Option<String>,
    /// Absolute page URL used as the base for relative links.
    pub source_url: String,
}

/// One image referenced by the Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Absolute URL, or a `page2md-raster://` key for rasterised drawings.
    pub remote_url: String,
    /// File name inside the `<title>/` folder.
    pub local_name: String,
    /// True when the bytes are a PNG produced from an SVG.
    pub rasterized: bool,
}

/// Counters for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub frames_contacted: usize,
    pub frames_captured: usize,
    pub charts_rasterized: usize,
    pub images: usize,
    pub extract_duration_ms: u64,
    pub raster_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The result of converting one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Sanitised title: the `.md` file stem and the image folder name.
    pub title: String,
    /// Final document: front-matter (when enabled) followed by Markdown.
    pub markdown: String,
    pub metadata: ArticleMetadata,
    /// Images in first-reference order.
    pub images: Vec<ImageRef>,
    /// Source → local name pairs for Download Dispatch, in order. Rasterised
    /// drawings appear with their `data:image/png;base64,…` source.
    pub download_map: Vec<(String, String)>,
    /// Absorbed per-item failures.
    pub warnings: Vec<ItemError>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Source URLs to hand to Download Dispatch, in order.
    pub fn download_urls(&self) -> Vec<String> {
        self.download_map.iter().map(|(url, _)| url.clone()).collect()
    }
}

/// An image successfully written by Download Dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedImage {
    pub url: String,
    pub local_name: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Outcome of a Download Dispatch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    pub markdown_path: PathBuf,
    pub saved: Vec<SavedImage>,
    pub failed: Vec<ItemError>,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Stage::RasterizingVectors.to_string(), "rasterizing-remaining-vectors");
        let json = serde_json::to_string(&Stage::CapturingFrames).unwrap();
        assert_eq!(json, "\"capturing-frames\"");
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::EmittingMarkdown.is_terminal());
    }

    #[test]
    fn download_urls_keep_order() {
        let out = ConversionOutput {
            title: "t".into(),
            markdown: String::new(),
            metadata: ArticleMetadata::default(),
            images: vec![],
            download_map: vec![
                ("https://a/x.png".into(), "x.png".into()),
                ("https://b/x.png".into(), "x_1.png".into()),
            ],
            warnings: vec![],
            stats: ConversionStats::default(),
        };
        assert_eq!(out.download_urls(), ["https://a/x.png", "https://b/x.png"]);
    }
}
