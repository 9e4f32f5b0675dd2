//! Progress-callback trait for conversion and download events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and as images land on
//! disk.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a channel, a WebSocket or a terminal
//! progress bar without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because image downloads complete
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use page2md::{ConversionProgressCallback, ConversionConfig, Stage};
//! use std::sync::{Arc, Mutex};
//!
//! struct StageLog {
//!     stages: Mutex<Vec<Stage>>,
//! }
//!
//! impl ConversionProgressCallback for StageLog {
//!     fn on_stage(&self, stage: Stage) {
//!         self.stages.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let log = Arc::new(StageLog { stages: Mutex::new(Vec::new()) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(log as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::Stage;
use std::sync::Arc;

/// Called by the conversion pipeline and Download Dispatch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_image_complete` and `on_image_error` may be called concurrently from
/// different tasks. Protect shared mutable state with `Mutex` or atomics.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called on every pipeline stage transition, including the terminal
    /// `Done` or `Failed`.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once frame capture has settled.
    ///
    /// # Arguments
    /// * `captured`  — frames whose response was accepted
    /// * `contacted` — frames that were sent a capture request
    fn on_frames_captured(&self, captured: usize, contacted: usize) {
        let _ = (captured, contacted);
    }

    /// Called before the first image download starts.
    fn on_download_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when an image has been written to its local name.
    fn on_image_complete(&self, local_name: &str) {
        let _ = local_name;
    }

    /// Called when an image could not be fetched or written.
    fn on_image_error(&self, url: &str, error: &str) {
        let _ = (url, error);
    }

    /// Called once when dispatch has finished every image.
    ///
    /// # Arguments
    /// * `images` — number of images saved
    fn on_conversion_complete(&self, images: usize) {
        let _ = images;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        completes: AtomicUsize,
        errors: AtomicUsize,
        download_total: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_download_start(&self, total: usize) {
            self.download_total.store(total, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _local_name: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_error(&self, _url: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage(Stage::Extracting);
        cb.on_frames_captured(1, 2);
        cb.on_download_start(3);
        cb.on_image_complete("a.png");
        cb.on_image_error("https://x/b.png", "404");
        cb.on_conversion_complete(3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage(Stage::CapturingFrames);
        tracker.on_stage(Stage::Extracting);
        tracker.on_download_start(3);
        tracker.on_image_complete("a.png");
        tracker.on_image_complete("b.png");
        tracker.on_image_error("https://x/c.png", "timeout");

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::CapturingFrames, Stage::Extracting]
        );
        assert_eq!(tracker.download_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_stage(Stage::Done);
        cb.on_conversion_complete(0);
    }
}
