//! # page2md
//!
//! Convert web pages to Markdown, saving their images next to the document
//! and turning SVG charts (including charts drawn inside embedded frames)
//! into PNG files.
//!
//! ## Why this crate?
//!
//! Clipping an article usually loses its best parts: charts are inline SVG
//! that no Markdown viewer renders, data visualisations live in iframes that
//! a content extractor strips, and images point at a CDN that will be gone in
//! a year. This crate keeps all three. Frame charts are captured before
//! extraction, vectors are rasterised, and every image is given a stable
//! local filename.
//!
//! ## Pipeline Overview
//!
//! ```text
//! HTML page
//!  │
//!  ├─ 1. Input     read a local file or fetch the URL
//!  ├─ 2. Frames    ask every visible frame's agent for its charts
//!  ├─ 3. Extract   placeholders for frames, then readability extraction
//!  ├─ 4. Rewrite   expand placeholders, rasterise SVG, normalise tables
//!  ├─ 5. Media     absolute image URLs, unique local filenames
//!  ├─ 6. Markdown  rule-based rendering + front matter
//!  └─ 7. Dispatch  <title>.md + <title>/ image folder
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page2md::{convert_to_dir, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let (output, report) = convert_to_dir("https://example.com/post", "clips", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} images saved, {} failed", report.saved.len(), report.failed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `page2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! page2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod dom;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_html, convert_sync, convert_to_dir, Page};
pub use error::{ItemError, Page2MdError};
pub use output::{ArticleMetadata, ConversionOutput, ConversionStats, DownloadReport, ImageRef, SavedImage, Stage};
pub use pipeline::dispatch::dispatch;
pub use pipeline::extract::{Article, Extractor, ReadabilityExtractor};
pub use pipeline::markdown::{MarkdownOptions, MarkdownRenderer, Rule};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, dispatch_stream, ImageStream};
