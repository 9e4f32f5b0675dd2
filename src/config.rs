//! Configuration types for page-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! config can be shared across tasks, logged, and diffed between two runs.
//!
//! # Design choice: builder over constructor
//! A thirteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on the
//! documented defaults for the rest.

use crate::error::Page2MdError;
use crate::pipeline::extract::{Extractor, ReadabilityExtractor};
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a page-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use page2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .frame_timeout_ms(2000)
///     .concurrency(4)
///     .capture_svg(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Capture charts from embedded `<iframe>`/`<frame>` documents. Default: true.
    pub capture_frames: bool,

    /// Rasterise inline `<svg>` and linked `.svg` images to PNG. Default: true.
    ///
    /// When disabled, `.svg` URLs are not treated as content images and inline
    /// drawings are dropped from the article.
    pub capture_svg: bool,

    /// Batch deadline for frame responses, in milliseconds. Default: 5000.
    ///
    /// One deadline covers every contacted frame: the pipeline proceeds with
    /// whatever arrived once it passes. A slow frame costs at most this long,
    /// never `n ×` this long.
    pub frame_timeout_ms: u64,

    /// Frames with a declared width or height below this many CSS pixels are
    /// treated as hidden (tracking pixels, ad beacons). Default: 16.
    pub min_frame_size: u32,

    /// SVGs whose known width or height is below this are icons and are not
    /// rasterised. Default: 64.0.
    pub icon_threshold: f64,

    /// Longest edge, in pixels, of a rasterised drawing. Default: 4096.
    ///
    /// A poster-sized `viewBox` would otherwise allocate hundreds of megabytes
    /// of pixmap. The other edge scales proportionally.
    pub max_raster_dimension: u32,

    /// Concurrent rasterisations and image downloads. Default: 8.
    pub concurrency: usize,

    /// Timeout for fetching the page, frame documents, linked SVGs and
    /// images, in seconds. Default: 60.
    pub fetch_timeout_secs: u64,

    /// Minimum article text length before the extractor relaxes its
    /// heuristics and retries. Default: 500.
    pub char_threshold: usize,

    /// Prepend YAML front-matter (title, author, source, date). Default: true.
    pub include_frontmatter: bool,

    /// Base URL used to resolve relative links. Default: the page URL.
    ///
    /// Useful for local HTML saved from a site: relative image paths then
    /// resolve against the live site instead of the file system.
    pub base_url: Option<String>,

    /// Content extractor. `None` uses [`ReadabilityExtractor`].
    pub extractor: Option<Arc<dyn Extractor>>,

    /// Receives stage transitions and download events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            capture_frames: true,
            capture_svg: true,
            frame_timeout_ms: 5000,
            min_frame_size: 16,
            icon_threshold: 64.0,
            max_raster_dimension: 4096,
            concurrency: 8,
            fetch_timeout_secs: 60,
            char_threshold: 500,
            include_frontmatter: true,
            base_url: None,
            extractor: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("capture_frames", &self.capture_frames)
            .field("capture_svg", &self.capture_svg)
            .field("frame_timeout_ms", &self.frame_timeout_ms)
            .field("min_frame_size", &self.min_frame_size)
            .field("icon_threshold", &self.icon_threshold)
            .field("max_raster_dimension", &self.max_raster_dimension)
            .field("concurrency", &self.concurrency)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("char_threshold", &self.char_threshold)
            .field("include_frontmatter", &self.include_frontmatter)
            .field("base_url", &self.base_url)
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn Extractor>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The configured extractor, or a Readability extractor honouring
    /// `char_threshold`.
    pub fn extractor(&self) -> Arc<dyn Extractor> {
        match &self.extractor {
            Some(e) => Arc::clone(e),
            None => Arc::new(ReadabilityExtractor::new().char_threshold(self.char_threshold)),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn capture_frames(mut self, v: bool) -> Self {
        self.config.capture_frames = v;
        self
    }

    pub fn capture_svg(mut self, v: bool) -> Self {
        self.config.capture_svg = v;
        self
    }

    pub fn frame_timeout_ms(mut self, ms: u64) -> Self {
        self.config.frame_timeout_ms = ms;
        self
    }

    pub fn min_frame_size(mut self, px: u32) -> Self {
        self.config.min_frame_size = px;
        self
    }

    pub fn icon_threshold(mut self, px: f64) -> Self {
        self.config.icon_threshold = px;
        self
    }

    pub fn max_raster_dimension(mut self, px: u32) -> Self {
        self.config.max_raster_dimension = px;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn char_threshold(mut self, n: usize) -> Self {
        self.config.char_threshold = n;
        self
    }

    pub fn include_frontmatter(mut self, v: bool) -> Self {
        self.config.include_frontmatter = v;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Page2MdError> {
        let c = &self.config;
        if c.frame_timeout_ms == 0 {
            return Err(Page2MdError::InvalidConfig(
                "Frame timeout must be ≥ 1 ms".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Page2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_raster_dimension < 16 {
            return Err(Page2MdError::InvalidConfig(format!(
                "Max raster dimension must be ≥ 16, got {}",
                c.max_raster_dimension
            )));
        }
        if !c.icon_threshold.is_finite() || c.icon_threshold < 0.0 {
            return Err(Page2MdError::InvalidConfig(format!(
                "Icon threshold must be a non-negative number, got {}",
                c.icon_threshold
            )));
        }
        if let Some(ref base) = c.base_url {
            url::Url::parse(base).map_err(|e| {
                Page2MdError::InvalidConfig(format!("Base URL '{}' is not absolute: {}", base, e))
            })?;
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let c = ConversionConfig::default();
        assert!(c.capture_frames);
        assert!(c.capture_svg);
        assert_eq!(c.frame_timeout_ms, 5000);
        assert_eq!(c.min_frame_size, 16);
        assert_eq!(c.icon_threshold, 64.0);
        assert_eq!(c.max_raster_dimension, 4096);
        assert_eq!(c.concurrency, 8);
        assert!(c.include_frontmatter);
        assert!(c.base_url.is_none());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn zero_frame_timeout_rejected() {
        let err = ConversionConfig::builder()
            .frame_timeout_ms(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Page2MdError::InvalidConfig(_)));
    }

    #[test]
    fn relative_base_url_rejected() {
        let err = ConversionConfig::builder()
            .base_url("/just/a/path")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not absolute"));
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = ConversionConfig::builder()
            .extractor(Arc::new(ReadabilityExtractor::new()))
            .build()
            .unwrap();
        let dbg = format!("{:?}", c);
        assert!(dbg.contains("<dyn Extractor>"));
    }
}
