//! Cross-frame chart capture.
//!
//! Charts are often embedded through `<iframe>`s (Datawrapper, Flourish,
//! notebook exports). The page's own extraction never sees inside them, so
//! every reachable frame gets a **frame agent**: a tokio task that owns the
//! frame's `Document` and answers capture requests over an `mpsc` channel.
//!
//! ```text
//!  parent                                  frame agent (one per frame)
//!  ──────                                  ───────────
//!  CaptureRequest{correlation_id,        ─▶ clone body, rasterise <svg>s,
//!                 settings, reply}
//!                                           swap them for <span> markers,
//!  ◀─ Envelope{type, correlationId,         absolutise img/a, pick title
//!             source, origin, payload}
//! ```
//!
//! ## Why validate every envelope?
//!
//! All agents reply into one shared channel, exactly like `postMessage` into
//! one window. A response is trusted only if its type is the result type,
//! its `source` is a frame this call contacted, its `origin` is that frame's
//! origin, and its correlation id is the one sent to that frame. Anything
//! else, and any duplicate, is dropped.
//!
//! ## Why one deadline?
//!
//! The parent waits for all frames together until `frame_timeout`, then
//! proceeds with whatever arrived. A hung frame costs one timeout, never one
//! per frame, and never fails the conversion.

use crate::config::ConversionConfig;
use crate::dom::{Document, NodeId};
use crate::error::ItemError;
use crate::pipeline::input;
use crate::pipeline::style::{self, StyleSheet};
use crate::pipeline::vector::{self, RasterJob};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Message type of a capture request.
pub const CAPTURE_REQUEST_TYPE: &str = "page2md-capture-svg";
/// Message type of a capture response.
pub const CAPTURE_RESULT_TYPE: &str = "page2md-svg-result";

/// Marker attribute carrying a chart's index inside captured frame markup.
pub const CHART_MARKER_ATTR: &str = "data-page2md-svg";
/// Alt text of a chart marker.
pub const CHART_ALT_ATTR: &str = "data-page2md-alt";

static CORRELATION_IDS: AtomicU64 = AtomicU64::new(1);
static FRAME_IDS: AtomicU64 = AtomicU64::new(1);

fn next_correlation_id() -> u64 {
    CORRELATION_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Process-unique identity of a frame agent.
pub type FrameId = u64;

/// A chart rasterised inside a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterizedChart {
    /// Value of the marker's `data-page2md-svg` attribute.
    pub index: usize,
    pub alt: String,
    /// `data:image/png;base64,…`
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

/// What a frame sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartCapture {
    pub frame_index: usize,
    pub title: String,
    /// The frame body's markup with charts replaced by marker `<span>`s.
    pub body_html: String,
    /// Indexed by the markers' `data-page2md-svg` values.
    pub rasterized_charts: Vec<RasterizedChart>,
}

/// Message envelope exchanged between the parent and frame agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: u64,
    pub source: FrameId,
    pub origin: String,
    pub payload: T,
}

/// Request delivered to a frame agent.
#[derive(Debug)]
pub struct CaptureRequest {
    pub kind: String,
    pub correlation_id: u64,
    /// Raster settings of the conversion asking; agents outlive any one config.
    pub settings: AgentSettings,
    pub reply_to: mpsc::Sender<Envelope<ChartCapture>>,
}

/// Parent-side handle on one frame agent.
#[derive(Debug, Clone)]
pub struct FrameChannel {
    pub id: FrameId,
    /// Position among the page's `<iframe>`/`<frame>` elements.
    pub frame_index: usize,
    /// The frame element in the page document.
    pub node: NodeId,
    /// Origin the frame's document was loaded from.
    pub origin: String,
    pub url: Url,
    sender: mpsc::Sender<CaptureRequest>,
}

impl FrameChannel {
    pub(crate) fn new(
        frame_index: usize,
        node: NodeId,
        url: Url,
        origin: String,
        sender: mpsc::Sender<CaptureRequest>,
    ) -> Self {
        Self {
            id: FRAME_IDS.fetch_add(1, Ordering::Relaxed),
            frame_index,
            node,
            origin,
            url,
            sender,
        }
    }
}

/// Frames registered for one page.
#[derive(Debug, Default)]
pub struct FrameRegistry {
    pub channels: Vec<FrameChannel>,
    /// Frames that could not be loaded; never contacted.
    pub unreachable: Vec<ItemError>,
}

/// Settings a frame agent needs, copied out of the conversion config.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub icon_threshold: f64,
    pub max_raster_dimension: u32,
    pub concurrency: usize,
}

impl From<&ConversionConfig> for AgentSettings {
    fn from(c: &ConversionConfig) -> Self {
        Self {
            icon_threshold: c.icon_threshold,
            max_raster_dimension: c.max_raster_dimension,
            concurrency: c.concurrency,
        }
    }
}

// ── Registration ─────────────────────────────────────────────────────────

static RE_DECLARED_PX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)").unwrap());

fn declared_px(value: &str) -> Option<f64> {
    if value.trim_end().ends_with('%') {
        return None;
    }
    RE_DECLARED_PX
        .captures(value)
        .and_then(|c| c[1].parse::<f64>().ok())
}

/// Hidden frames: `hidden`, `display:none`, `visibility:hidden`, or a
/// declared width/height below `min_size` px.
pub fn is_hidden_frame(doc: &Document, frame: NodeId, min_size: u32) -> bool {
    let Some(element) = doc.element(frame) else {
        return true;
    };
    if element.has_attr("hidden") {
        return true;
    }
    let style = element.attr("style").unwrap_or("");
    let display = style::inline_property(style, "display");
    let visibility = style::inline_property(style, "visibility");
    if display.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("none"))
        || visibility.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("hidden"))
    {
        return true;
    }
    let min = f64::from(min_size);
    ["width", "height"].iter().any(|dim| {
        let declared = style::inline_property(style, dim)
            .or_else(|| element.attr(dim).map(str::to_string));
        declared
            .as_deref()
            .and_then(declared_px)
            .is_some_and(|px| px < min)
    })
}

fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Load a frame's document: `srcdoc` first, then `src`.
async fn load_frame(
    doc: &Document,
    frame: NodeId,
    page_url: &Url,
    timeout: Duration,
) -> Result<(Document, Url), String> {
    if let Some(srcdoc) = doc.attr(frame, "srcdoc") {
        return Ok((Document::parse(srcdoc), page_url.clone()));
    }
    let src = doc
        .attr(frame, "src")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "no src".to_string())?;
    let url = page_url
        .join(src)
        .map_err(|e| format!("bad src '{}': {}", src, e))?;
    match url.scheme() {
        "http" | "https" | "file" => {}
        other => return Err(format!("cannot load '{}' frames", other)),
    }
    let html = input::fetch_text(&url, timeout)
        .await
        .map_err(|e| e.to_string())?;
    Ok((Document::parse(&html), url))
}

/// Find, load and start agents for every visible, reachable frame of `doc`.
pub async fn register_frames(doc: &Document, page_url: &Url, config: &ConversionConfig) -> FrameRegistry {
    let frames = doc.elements_by_tag(doc.root(), &["iframe", "frame"]);
    let timeout = config.fetch_timeout();

    let visible: Vec<(usize, NodeId)> = frames
        .iter()
        .copied()
        .enumerate()
        .filter(|&(i, node)| {
            let hidden = is_hidden_frame(doc, node, config.min_frame_size);
            if hidden {
                debug!("Skipping hidden frame {}", i);
            }
            !hidden
        })
        .collect();

    let loaded = futures::future::join_all(
        visible
            .iter()
            .map(|&(_, node)| load_frame(doc, node, page_url, timeout)),
    )
    .await;

    let mut registry = FrameRegistry::default();
    for ((frame_index, node), result) in visible.into_iter().zip(loaded) {
        match result {
            Ok((frame_doc, url)) => {
                let origin = origin_of(&url);
                registry
                    .channels
                    .push(spawn_agent(frame_index, node, frame_doc, url, origin));
            }
            Err(detail) => {
                warn!("Frame {} unreachable: {}", frame_index, detail);
                registry
                    .unreachable
                    .push(ItemError::FrameUnreachable { frame_index, detail });
            }
        }
    }
    info!(
        "Registered {} frame agents ({} frames found, {} unreachable)",
        registry.channels.len(),
        frames.len(),
        registry.unreachable.len()
    );
    registry
}

// ── Frame agent ──────────────────────────────────────────────────────────

fn spawn_agent(
    frame_index: usize,
    node: NodeId,
    doc: Document,
    url: Url,
    origin: String,
) -> FrameChannel {
    let (tx, mut rx) = mpsc::channel::<CaptureRequest>(8);
    let channel = FrameChannel::new(frame_index, node, url.clone(), origin.clone(), tx);
    let id = channel.id;
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            if request.kind != CAPTURE_REQUEST_TYPE {
                continue;
            }
            let payload = capture_document(&doc, &url, frame_index, request.settings).await;
            let envelope = Envelope {
                kind: CAPTURE_RESULT_TYPE.to_string(),
                correlation_id: request.correlation_id,
                source: id,
                origin: origin.clone(),
                payload,
            };
            if request.reply_to.send(envelope).await.is_err() {
                debug!("Frame {}: parent stopped listening", frame_index);
            }
        }
        debug!("Frame agent {} stopped", frame_index);
    });
    channel
}

/// Text alternative for a chart.
pub(crate) fn chart_alt(doc: &Document, svg: NodeId) -> String {
    let non_empty = |s: &str| {
        let t = s.trim();
        (!t.is_empty()).then(|| t.to_string())
    };
    doc.attr(svg, "aria-label")
        .and_then(non_empty)
        .or_else(|| doc.attr(svg, "title").and_then(non_empty))
        .or_else(|| {
            doc.children(svg)
                .iter()
                .find(|&&c| doc.is(c, "title"))
                .and_then(|&t| non_empty(&doc.text_content(t)))
        })
        .unwrap_or_else(|| "chart".to_string())
}

/// First heading-like element's text, else the document `<title>`.
fn frame_title(doc: &Document) -> String {
    doc.descendant_elements(doc.root())
        .into_iter()
        .find(|&n| {
            doc.is_any(n, &["h1", "h2", "h3"])
                || doc
                    .attr(n, "class")
                    .is_some_and(|c| c.contains("title") || c.contains("Title"))
        })
        .map(|n| doc.text_content(n).trim().to_string())
        .or_else(|| doc.title())
        .unwrap_or_default()
}

/// Rewrite `attr` of every `tag` below `root` to an absolute URL.
pub(crate) fn absolutize(doc: &mut Document, root: NodeId, tag: &str, attr: &str, base: &Url) {
    for node in doc.elements_by_tag(root, &[tag]) {
        let Some(value) = doc.attr(node, attr).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Ok(abs) = base.join(value) {
            let abs = abs.to_string();
            doc.set_attr(node, attr, abs);
        }
    }
}

/// Build a frame's capture response.
pub async fn capture_document(
    doc: &Document,
    url: &Url,
    frame_index: usize,
    settings: AgentSettings,
) -> ChartCapture {
    let sheet = StyleSheet::from_document(doc);
    let mut work = doc.clone();
    let body = work.body().unwrap_or_else(|| work.root());

    let svgs: Vec<NodeId> = work
        .elements_by_tag(body, &["svg"])
        .into_iter()
        .filter(|&s| !work.has_ancestor_tag(s, "svg", 0))
        .collect();

    let mut targets = Vec::new();
    let mut jobs = Vec::new();
    for svg in svgs {
        style::inline_svg_styles(&mut work, svg, &sheet);
        if let Some(job) = RasterJob::inline(&work, svg, settings.icon_threshold) {
            targets.push(svg);
            jobs.push(job);
        }
    }

    let results = vector::rasterize_batch(jobs, settings.concurrency, settings.max_raster_dimension).await;

    let mut charts = Vec::new();
    for (svg, result) in targets.into_iter().zip(results) {
        match result {
            Ok(raster) => {
                let index = charts.len();
                let alt = chart_alt(&work, svg);
                let index_str = index.to_string();
                let marker = work.create_element_with(
                    "span",
                    &[(CHART_MARKER_ATTR, index_str.as_str()), (CHART_ALT_ATTR, alt.as_str())],
                );
                work.replace(svg, marker);
                charts.push(RasterizedChart {
                    index,
                    alt,
                    data_url: raster.data_url(),
                    width: raster.width,
                    height: raster.height,
                });
            }
            Err(e) => warn!("Frame {}: {}", frame_index, e),
        }
    }

    absolutize(&mut work, body, "img", "src", url);
    absolutize(&mut work, body, "a", "href", url);

    ChartCapture {
        frame_index,
        title: frame_title(doc),
        body_html: work.inner_html(body),
        rasterized_charts: charts,
    }
}

// ── Parent side ──────────────────────────────────────────────────────────

/// Result of one capture round.
#[derive(Debug, Default)]
pub struct CaptureOutcome {
    /// Accepted responses keyed by frame index.
    pub captures: BTreeMap<usize, ChartCapture>,
    pub contacted: usize,
    pub warnings: Vec<ItemError>,
}

/// Ask every frame for its charts and wait until all answered or the batch
/// deadline passed.
pub async fn capture_frames(channels: &[FrameChannel], settings: AgentSettings, timeout: Duration) -> CaptureOutcome {
    let mut outcome = CaptureOutcome::default();
    if channels.is_empty() {
        return outcome;
    }

    let deadline = Instant::now() + timeout;
    let (reply_tx, mut reply_rx) = mpsc::channel::<Envelope<ChartCapture>>(channels.len());
    let mut expected: HashMap<FrameId, (u64, &FrameChannel)> = HashMap::new();

    for channel in channels {
        let correlation_id = next_correlation_id();
        let request = CaptureRequest {
            kind: CAPTURE_REQUEST_TYPE.to_string(),
            correlation_id,
            settings,
            reply_to: reply_tx.clone(),
        };
        match tokio::time::timeout_at(deadline, channel.sender.send(request)).await {
            Ok(Ok(())) => {
                expected.insert(channel.id, (correlation_id, channel));
            }
            _ => {
                warn!("Frame {} agent is not accepting requests", channel.frame_index);
                outcome.warnings.push(ItemError::FrameUnreachable {
                    frame_index: channel.frame_index,
                    detail: "frame agent stopped".into(),
                });
            }
        }
    }
    // Only agents hold reply senders now; the channel closes once all of
    // them have answered or quit.
    drop(reply_tx);
    outcome.contacted = expected.len();

    let mut answered: HashMap<FrameId, ChartCapture> = HashMap::new();
    while answered.len() < expected.len() {
        let envelope = match tokio::time::timeout_at(deadline, reply_rx.recv()).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => break,
            Err(_) => {
                debug!("Frame capture deadline reached");
                break;
            }
        };
        let Some(&(correlation_id, channel)) = expected.get(&envelope.source) else {
            warn!("Ignoring response from unknown frame source {}", envelope.source);
            continue;
        };
        if envelope.kind != CAPTURE_RESULT_TYPE
            || envelope.origin != channel.origin
            || envelope.correlation_id != correlation_id
        {
            warn!(
                "Ignoring response for frame {}: type/origin/correlation mismatch",
                channel.frame_index
            );
            continue;
        }
        if answered.contains_key(&envelope.source) {
            debug!("Ignoring duplicate response from frame {}", channel.frame_index);
            continue;
        }
        let mut payload = envelope.payload;
        payload.frame_index = channel.frame_index;
        answered.insert(envelope.source, payload);
    }

    for (id, (_, channel)) in &expected {
        if !answered.contains_key(id) {
            warn!("Frame {} did not respond in time", channel.frame_index);
            outcome.warnings.push(ItemError::FrameTimeout {
                frame_index: channel.frame_index,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    }
    outcome.warnings.sort_by_key(|w| match w {
        ItemError::FrameTimeout { frame_index, .. } | ItemError::FrameUnreachable { frame_index, .. } => *frame_index,
        _ => usize::MAX,
    });
    outcome.captures = answered
        .into_values()
        .map(|c| (c.frame_index, c))
        .collect();
    info!(
        "Captured {}/{} frames",
        outcome.captures.len(),
        outcome.contacted
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AgentSettings {
        AgentSettings {
            icon_threshold: 64.0,
            max_raster_dimension: 4096,
            concurrency: 2,
        }
    }

    fn base() -> Url {
        Url::parse("https://charts.example/embed/").unwrap()
    }

    /// Agent that answers through `respond`, for protocol tests.
    fn scripted_agent<F>(frame_index: usize, origin: &str, respond: F) -> FrameChannel
    where
        F: Fn(&FrameChannel, CaptureRequest) -> Option<(CaptureRequest, Envelope<ChartCapture>)>
            + Send
            + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<CaptureRequest>(4);
        let channel = FrameChannel::new(frame_index, Document::new().root(), base(), origin.to_string(), tx);
        let me = channel.clone();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                if let Some((req, env)) = respond(&me, req) {
                    let _ = req.reply_to.send(env).await;
                }
            }
        });
        channel
    }

    fn reply(channel: &FrameChannel, req: &CaptureRequest) -> Envelope<ChartCapture> {
        Envelope {
            kind: CAPTURE_RESULT_TYPE.into(),
            correlation_id: req.correlation_id,
            source: channel.id,
            origin: channel.origin.clone(),
            payload: ChartCapture {
                frame_index: 99,
                title: format!("frame {}", channel.frame_index),
                body_html: "<p>chart</p>".into(),
                rasterized_charts: vec![],
            },
        }
    }

    #[test]
    fn hidden_frames() {
        let doc = Document::parse(
            "<iframe hidden src='a'></iframe>\
             <iframe style='display: none' src='b'></iframe>\
             <iframe width='1' height='1' src='c'></iframe>\
             <iframe style='width:0;height:0' src='d'></iframe>\
             <iframe width='100%' height='400' src='e'></iframe>\
             <iframe src='f'></iframe>",
        );
        let frames = doc.elements_by_tag(doc.root(), &["iframe"]);
        let hidden: Vec<bool> = frames.iter().map(|&f| is_hidden_frame(&doc, f, 16)).collect();
        assert_eq!(hidden, [true, true, true, true, false, false]);
    }

    #[test]
    fn envelope_uses_camel_case_wire_names() {
        let env = Envelope {
            kind: CAPTURE_RESULT_TYPE.to_string(),
            correlation_id: 7,
            source: 3,
            origin: "https://a.example".into(),
            payload: (),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], CAPTURE_RESULT_TYPE);
        assert_eq!(json["correlationId"], 7);
    }

    #[tokio::test]
    async fn capture_replaces_charts_with_markers() {
        let doc = Document::parse(
            "<html><head><title>Doc title</title><style>.bar{fill:green}</style></head><body>\
             <h2 class='x'>Quarterly revenue</h2>\
             <svg width='200' height='100' aria-label='Revenue chart'><rect class='bar' width='50' height='50'/></svg>\
             <svg width='16' height='16'><path d='M0 0L1 1'/></svg>\
             <img src='logo.png'><a href='/about'>about</a></body></html>",
        );
        let capture = capture_document(&doc, &base(), 0, settings()).await;
        assert_eq!(capture.title, "Quarterly revenue");
        assert_eq!(capture.rasterized_charts.len(), 1);
        assert_eq!(capture.rasterized_charts[0].alt, "Revenue chart");
        assert_eq!(capture.rasterized_charts[0].width, 200);
        assert!(capture.body_html.contains(r#"<span data-page2md-svg="0" data-page2md-alt="Revenue chart"></span>"#));
        // icon stays as markup; expansion strips it later
        assert!(capture.body_html.contains("<svg"));
        assert!(capture.body_html.contains(r#"src="https://charts.example/embed/logo.png""#));
        assert!(capture.body_html.contains(r#"href="https://charts.example/about""#));
    }

    #[tokio::test]
    async fn srcdoc_frames_register_and_capture() {
        let page = Document::parse(
            r#"<p>intro</p><iframe srcdoc="<h1>Embedded</h1><svg width='100' height='100'></svg>"></iframe>
               <iframe src="javascript:void(0)"></iframe>"#,
        );
        let config = ConversionConfig::default();
        let registry = register_frames(&page, &Url::parse("https://news.example/a").unwrap(), &config).await;
        assert_eq!(registry.channels.len(), 1);
        assert_eq!(registry.unreachable.len(), 1);
        assert_eq!(registry.channels[0].origin, "https://news.example");

        let outcome = capture_frames(&registry.channels, settings(), Duration::from_secs(5)).await;
        assert_eq!(outcome.contacted, 1);
        let capture = &outcome.captures[&0];
        assert_eq!(capture.title, "Embedded");
        assert_eq!(capture.rasterized_charts.len(), 1);
    }

    #[tokio::test]
    async fn each_request_carries_its_own_settings() {
        let page = Document::parse(r#"<iframe srcdoc="<svg width='200' height='100'></svg>"></iframe>"#);
        let registry = register_frames(&page, &base(), &ConversionConfig::default()).await;

        let strict = AgentSettings {
            icon_threshold: 500.0,
            ..settings()
        };
        let first = capture_frames(&registry.channels, strict, Duration::from_secs(5)).await;
        assert!(first.captures[&0].rasterized_charts.is_empty());

        let second = capture_frames(&registry.channels, settings(), Duration::from_secs(5)).await;
        assert_eq!(second.captures[&0].rasterized_charts.len(), 1);
    }

    #[tokio::test]
    async fn timeout_returns_partial_results() {
        let fast = scripted_agent(0, "https://a.example", |ch, req| {
            let env = reply(ch, &req);
            Some((req, env))
        });
        // Keeps the request (and its reply sender) alive without answering.
        let (park_tx, mut park_rx) = mpsc::unbounded_channel::<CaptureRequest>();
        let slow = scripted_agent(1, "https://b.example", move |_, req| {
            let _ = park_tx.send(req);
            None
        });

        let started = std::time::Instant::now();
        let outcome = capture_frames(&[fast, slow], settings(), Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.contacted, 2);
        assert_eq!(outcome.captures.len(), 1);
        assert!(outcome.captures.contains_key(&0));
        assert!(matches!(outcome.warnings[0], ItemError::FrameTimeout { frame_index: 1, .. }));
        park_rx.close();
    }

    #[tokio::test]
    async fn spoofed_responses_ignored() {
        // Replies with the wrong origin.
        let wrong_origin = scripted_agent(0, "https://a.example", |ch, req| {
            let mut env = reply(ch, &req);
            env.origin = "https://evil.example".into();
            Some((req, env))
        });
        // Replies with a stale correlation id.
        let wrong_id = scripted_agent(1, "https://b.example", |ch, req| {
            let mut env = reply(ch, &req);
            env.correlation_id += 1000;
            Some((req, env))
        });
        // Claims to be a frame nobody contacted.
        let wrong_source = scripted_agent(2, "https://c.example", |ch, req| {
            let mut env = reply(ch, &req);
            env.source = u64::MAX;
            Some((req, env))
        });
        let honest = scripted_agent(3, "https://d.example", |ch, req| {
            let env = reply(ch, &req);
            Some((req, env))
        });

        let outcome = capture_frames(
            &[wrong_origin, wrong_id, wrong_source, honest],
            settings(),
            Duration::from_millis(300),
        )
        .await;
        assert_eq!(outcome.captures.len(), 1);
        let accepted = &outcome.captures[&3];
        assert_eq!(accepted.frame_index, 3);
        assert_eq!(accepted.title, "frame 3");
    }

    #[tokio::test]
    async fn duplicate_responses_ignored() {
        let chatty = scripted_agent(0, "https://a.example", |ch, req| {
            let env = reply(ch, &req);
            let tx = req.reply_to.clone();
            let mut second = env.clone();
            second.payload.title = "second".into();
            tokio::spawn(async move {
                let _ = tx.send(second).await;
            });
            Some((req, env))
        });
        let outcome = capture_frames(&[chatty], settings(), Duration::from_millis(300)).await;
        assert_eq!(outcome.captures.len(), 1);
        assert_eq!(outcome.captures[&0].title, "frame 0");
    }

    #[tokio::test]
    async fn stopped_agent_is_unreachable_not_timeout() {
        let (tx, rx) = mpsc::channel::<CaptureRequest>(1);
        drop(rx);
        let dead = FrameChannel::new(4, Document::new().root(), base(), "https://x.example".into(), tx);
        let outcome = capture_frames(&[dead], settings(), Duration::from_millis(100)).await;
        assert_eq!(outcome.contacted, 0);
        assert!(matches!(outcome.warnings[0], ItemError::FrameUnreachable { frame_index: 4, .. }));
    }
}
