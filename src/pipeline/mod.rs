//! Pipeline stages for web-page-to-Markdown conversion.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and the extractor or renderer swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ frames ──▶ rewrite ──▶ extract ──▶ rewrite ──▶ media ──▶ markdown ──▶ postprocess
//! (fetch)   (agents)   (placeholders) (readability) (expand, raster) (images) (turndown) (cleanup)
//!                                                                               │
//!                                                                 dispatch ◀────┘
//!                                                                 (write .md + images)
//! ```
//!
//! 1. [`input`]    — read a local file or fetch a URL; shared HTTP client
//! 2. [`frames`]   — one agent per visible frame; request/response capture
//!    with correlation ids and a single deadline
//! 3. [`rewrite`]  — frame placeholders, their expansion after extraction,
//!    inline vector rasterisation and table/cell normalisation
//! 4. [`extract`]  — readability-style main-content extraction
//! 5. [`media`]    — absolute image URLs, collection and linked vectors
//! 6. [`naming`]   — unique local filenames for the image folder
//! 7. [`markdown`] — rule-based HTML-to-Markdown rendering
//! 8. [`postprocess`] — deterministic text cleanup
//! 9. [`dispatch`] — atomic Markdown write and concurrent image saves
//!
//! Helpers: [`style`] (CSS cascade for SVG inlining), [`vector`] (resvg
//! rendering), [`encode`] (PNG and data URLs), [`sanitize`] (filenames) and
//! [`frontmatter`] (YAML header).

pub mod dispatch;
pub mod encode;
pub mod extract;
pub mod frames;
pub mod frontmatter;
pub mod input;
pub mod markdown;
pub mod media;
pub mod naming;
pub mod postprocess;
pub mod rewrite;
pub mod sanitize;
pub mod style;
pub mod vector;
