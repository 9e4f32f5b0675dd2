//! Error types for the page2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Page2MdError`] — **Fatal**: the conversion cannot proceed at all
//!   (missing input file, unreachable URL, no readable content). Returned as
//!   `Err(Page2MdError)` from the top-level `convert*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: one chart, frame or image failed, but the
//!   rest of the document is fine. Collected in
//!   [`crate::output::ConversionOutput::warnings`] and
//!   [`crate::output::DownloadReport::failed`] so callers can inspect partial
//!   success instead of losing the whole page to one broken `<svg>`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the page2md library.
#[derive(Debug, Error)]
pub enum Page2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("HTML file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but the fetch failed.
    #[error("Failed to fetch '{url}': {reason}\nCheck your internet connection.")]
    FetchFailed { url: String, reason: String },

    /// Fetch exceeded the configured timeout.
    #[error("Fetch timed out after {secs}s for '{url}'\nIncrease --fetch-timeout.")]
    FetchTimeout { url: String, secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extractor found no readable content in the page.
    #[error("could not extract content from '{url}'")]
    ExtractionFailed { url: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single chart, frame or image.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// An SVG could not be parsed or rendered.
    #[error("rasterisation failed for {target}: {detail}")]
    RasterizeFailed { target: String, detail: String },

    /// A frame's document could not be loaded; it was never contacted.
    #[error("frame {frame_index} unreachable: {detail}")]
    FrameUnreachable { frame_index: usize, detail: String },

    /// A contacted frame did not answer before the batch deadline.
    #[error("frame {frame_index} did not respond within {timeout_ms}ms")]
    FrameTimeout { frame_index: usize, timeout_ms: u64 },

    /// An image could not be fetched.
    #[error("download of '{url}' failed: {detail}")]
    DownloadFailed { url: String, detail: String },

    /// An image was fetched but could not be written.
    #[error("writing '{path}' failed: {detail}")]
    WriteFailed { path: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_failed_display() {
        let e = Page2MdError::ExtractionFailed {
            url: "https://example.com/".into(),
        };
        assert!(e.to_string().contains("could not extract content"));
        assert!(e.to_string().contains("example.com"));
    }

    #[test]
    fn fetch_timeout_display() {
        let e = Page2MdError::FetchTimeout {
            url: "https://slow.example".into(),
            secs: 60,
        };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn frame_timeout_display() {
        let e = ItemError::FrameTimeout {
            frame_index: 2,
            timeout_ms: 5000,
        };
        let msg = e.to_string();
        assert!(msg.contains("frame 2"), "got: {msg}");
        assert!(msg.contains("5000ms"), "got: {msg}");
    }

    #[test]
    fn item_error_serialises() {
        let e = ItemError::DownloadFailed {
            url: "https://x/y.png".into(),
            detail: "404".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("DownloadFailed"));
        let back: ItemError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
