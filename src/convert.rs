//! Conversion entry points.
//!
//! [`Page`] is a loaded page: its parsed document, its URL and, once the
//! first conversion asked for them, its frame agents. Everything else here
//! is a convenience wrapper that loads a page and converts it once.
//!
//! ## Frame agents
//!
//! Frames are loaded and their agents spawned exactly once per page. A second
//! conversion of the same page (different config, retry after a timeout)
//! talks to the same agents instead of fetching every frame again.

use crate::config::ConversionConfig;
use crate::dom::Document;
use crate::error::Page2MdError;
use crate::output::{ArticleMetadata, ConversionOutput, ConversionStats, DownloadReport, ImageRef, Stage};
use crate::pipeline::extract::Article;
use crate::pipeline::frames::{self, AgentSettings, FrameRegistry};
use crate::pipeline::markdown::{ImageRule, MarkdownRenderer};
use crate::pipeline::rewrite::{self, RasterTable};
use crate::pipeline::{dispatch, frontmatter, input, media, naming, postprocess, sanitize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

/// Reports every stage transition to the log and the progress callback.
struct StageTracker<'a> {
    config: &'a ConversionConfig,
    current: Stage,
}

impl<'a> StageTracker<'a> {
    fn new(config: &'a ConversionConfig) -> Self {
        Self {
            config,
            current: Stage::Idle,
        }
    }

    fn enter(&mut self, next: Stage) {
        debug!("Stage {} → {}", self.current, next);
        self.current = next;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(next);
        }
    }
}

/// A page ready for conversion.
#[derive(Debug)]
pub struct Page {
    document: Document,
    url: Url,
    frames: OnceCell<FrameRegistry>,
}

impl Page {
    pub fn new(document: Document, url: Url) -> Self {
        Self {
            document,
            url,
            frames: OnceCell::new(),
        }
    }

    /// Parse `html` as the page found at `url`.
    pub fn parse(html: &str, url: Url) -> Self {
        Self::new(Document::parse(html), url)
    }

    /// Load a local file or an HTTP(S) URL. `config.base_url`, when set,
    /// replaces the URL relative references resolve against.
    pub async fn load(input_str: &str, config: &ConversionConfig) -> Result<Self, Page2MdError> {
        let source = input::resolve_input(input_str, config.fetch_timeout_secs).await?;
        let url = match config.base_url {
            Some(ref base) => Url::parse(base)
                .map_err(|e| Page2MdError::InvalidConfig(format!("base_url '{}': {}", base, e)))?,
            None => source.url,
        };
        Ok(Self::parse(&source.html, url))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Frame agents, if a conversion has registered them.
    pub fn registered_frames(&self) -> Option<&FrameRegistry> {
        self.frames.get()
    }

    /// Agents are registered by the first conversion that needs them; only
    /// frame loading reads that conversion's config. Raster settings travel
    /// with every capture request.
    async fn frames(&self, config: &ConversionConfig) -> &FrameRegistry {
        self.frames
            .get_or_init(|| frames::register_frames(&self.document, &self.url, config))
            .await
    }

    /// Convert the page to Markdown.
    ///
    /// # Errors
    /// [`Page2MdError::ExtractionFailed`] when the extractor finds no
    /// article. Per-item failures (frames, charts) never fail the conversion;
    /// they are returned in [`ConversionOutput::warnings`].
    pub async fn convert(&self, config: &ConversionConfig) -> Result<ConversionOutput, Page2MdError> {
        let total_start = Instant::now();
        let mut stage = StageTracker::new(config);
        let mut warnings = Vec::new();
        let mut stats = ConversionStats::default();
        info!("Converting {}", self.url);

        // ── Frame capture ────────────────────────────────────────────────
        stage.enter(Stage::CapturingFrames);
        let (channels, captures) = if config.capture_frames {
            let registry = self.frames(config).await;
            warnings.extend(registry.unreachable.iter().cloned());
            let outcome = frames::capture_frames(
                &registry.channels,
                AgentSettings::from(config),
                config.frame_timeout(),
            )
            .await;
            stats.frames_contacted = outcome.contacted;
            stats.frames_captured = outcome.captures.len();
            if let Some(ref cb) = config.progress_callback {
                cb.on_frames_captured(outcome.captures.len(), outcome.contacted);
            }
            warnings.extend(outcome.warnings);
            (registry.channels.as_slice(), outcome.captures)
        } else {
            (&[][..], BTreeMap::new())
        };

        let mut work = self.document.clone();
        if config.capture_svg {
            rewrite::inline_page_styles(&mut work);
        }
        rewrite::inject_placeholders(&mut work, channels, &captures);

        // ── Extraction ───────────────────────────────────────────────────
        stage.enter(Stage::Extracting);
        let extract_start = Instant::now();
        let Some(article) = config.extractor().extract(&work, &self.url) else {
            stage.enter(Stage::Failed);
            warn!("No article content found in {}", self.url);
            return Err(Page2MdError::ExtractionFailed {
                url: self.url.to_string(),
            });
        };
        stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
        let Article {
            title: article_title,
            byline,
            excerpt,
            site_name,
            content: mut doc,
            root,
        } = article;

        // ── DOM rewrite ──────────────────────────────────────────────────
        stage.enter(Stage::ExpandingPlaceholders);
        let mut rasters = RasterTable::new();
        let frame_charts = rewrite::expand_placeholders(&mut doc, root, &captures, &mut rasters);

        stage.enter(Stage::RasterizingVectors);
        let raster_start = Instant::now();
        let mut charts = frame_charts;
        if config.capture_svg {
            let (inline_charts, raster_warnings) = rewrite::rasterize_remaining_vectors(
                &mut doc,
                root,
                &mut rasters,
                config.icon_threshold,
                config.concurrency,
                config.max_raster_dimension,
            )
            .await;
            charts += inline_charts;
            warnings.extend(raster_warnings);
        }

        stage.enter(Stage::NormalizingStructure);
        rewrite::normalize_structure(&mut doc, root);

        // ── Media ────────────────────────────────────────────────────────
        stage.enter(Stage::CollectingMedia);
        media::normalize_image_sources(&mut doc, root, &self.url);
        media::normalize_link_targets(&mut doc, root, &self.url);
        let urls = media::collect_image_urls(&doc, root, config.capture_svg);
        let mut url_map = naming::build_url_map(&urls);
        let mut substitution = rasters.substitutions();
        let mut skipped = HashSet::new();
        if config.capture_svg {
            let linked = media::rasterize_linked_vectors(&mut url_map, config).await;
            charts += linked.rasterized;
            substitution.extend(linked.substitutions);
            skipped = linked.skipped;
            warnings.extend(linked.warnings);
        }
        stats.raster_duration_ms = raster_start.elapsed().as_millis() as u64;
        stats.charts_rasterized = charts;
        let download_map = naming::remap(&url_map, &substitution);

        // ── Markdown ─────────────────────────────────────────────────────
        stage.enter(Stage::EmittingMarkdown);
        let display_title = if article_title.trim().is_empty() {
            self.document.title().unwrap_or_default()
        } else {
            article_title
        };
        let title = sanitize::sanitize_filename(&display_title);
        let image_rule = ImageRule::new(title.as_str(), &url_map, config.capture_svg).skip(skipped);
        let renderer = MarkdownRenderer::default().with_rule(image_rule);
        let body = postprocess::clean_markdown(&renderer.render(&doc, root));

        let source_url = self.url.to_string();
        let markdown = if config.include_frontmatter {
            let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
            let header = frontmatter::build_frontmatter(&[
                ("title", Some(display_title.as_str())),
                ("author", byline.as_deref()),
                ("source", Some(source_url.as_str())),
                ("date", Some(date.as_str())),
            ]);
            if header.is_empty() {
                body
            } else {
                format!("{}\n{}", header, body)
            }
        } else {
            body
        };

        let images: Vec<ImageRef> = url_map
            .iter()
            .map(|(url, local)| ImageRef {
                remote_url: url.to_string(),
                local_name: local.to_string(),
                rasterized: substitution.contains_key(url),
            })
            .collect();
        stats.images = images.len();
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        stage.enter(Stage::Done);
        info!(
            "Converted '{}': {} images, {} charts, {} warnings, {}ms",
            title,
            stats.images,
            stats.charts_rasterized,
            warnings.len(),
            stats.total_duration_ms
        );

        Ok(ConversionOutput {
            title,
            markdown,
            metadata: ArticleMetadata {
                title: display_title,
                byline,
                excerpt,
                site_name,
                source_url,
            },
            images,
            download_map: download_map.into_entries(),
            warnings,
            stats,
        })
    }
}

/// Convert a local HTML file or an HTTP(S) URL to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(Page2MdError)` only for fatal errors: the input cannot be
/// read or fetched, the config is invalid, or no article content was found.
pub async fn convert(input_str: impl AsRef<str>, config: &ConversionConfig) -> Result<ConversionOutput, Page2MdError> {
    let page = Page::load(input_str.as_ref(), config).await?;
    page.convert(config).await
}

/// Convert markup already in memory; `base_url` is where the page lives.
pub async fn convert_html(
    html: &str,
    base_url: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Page2MdError> {
    let url = Url::parse(base_url).map_err(|_| Page2MdError::InvalidInput {
        input: base_url.to_string(),
    })?;
    Page::parse(html, url).convert(config).await
}

/// Convert and write `<out_dir>/<title>.md` plus the image folder.
pub async fn convert_to_dir(
    input_str: impl AsRef<str>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<(ConversionOutput, DownloadReport), Page2MdError> {
    let output = convert(input_str, config).await?;
    let report = dispatch::dispatch(
        out_dir.as_ref(),
        &output.title,
        &output.markdown,
        &output.download_urls(),
        &output.download_map,
        config,
    )
    .await?;
    Ok((output, report))
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(input_str: impl AsRef<str>, config: &ConversionConfig) -> Result<ConversionOutput, Page2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Page2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}
