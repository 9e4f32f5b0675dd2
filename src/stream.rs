//! Streaming dispatch API: emit saved images as they complete.
//!
//! [`crate::pipeline::dispatch::dispatch`] returns only after every image has
//! been saved. [`dispatch_stream`] writes the Markdown file first and then
//! yields one item per image as each finishes, so callers can drive their own
//! progress display or stop early by dropping the stream. Items arrive in
//! completion order, not document order.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::{ItemError, Page2MdError};
use crate::output::{ConversionOutput, SavedImage};
use crate::pipeline::dispatch::{self, display_url};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of image results.
pub type ImageStream = Pin<Box<dyn Stream<Item = Result<SavedImage, ItemError>> + Send>>;

/// Write `<out_dir>/<title>.md`, then stream the image downloads.
///
/// # Returns
/// - `Ok((path, ImageStream))` — the Markdown path and one item per mapped image
/// - `Err(Page2MdError)` — the Markdown file could not be written
pub async fn dispatch_stream(
    out_dir: &Path,
    title: &str,
    markdown: &str,
    image_urls: &[String],
    url_to_local: &[(String, String)],
    config: &ConversionConfig,
) -> Result<(PathBuf, ImageStream), Page2MdError> {
    let markdown_path = dispatch::write_markdown(out_dir, title, markdown).await?;
    let jobs = dispatch::plan_downloads(out_dir, title, image_urls, url_to_local);
    info!("Streaming {} images to {}", jobs.len(), out_dir.display());
    if let Some(ref cb) = config.progress_callback {
        cb.on_download_start(jobs.len());
    }

    let timeout = config.fetch_timeout();
    let callback = config.progress_callback.clone();
    let s = stream::iter(jobs.into_iter().map(move |job| {
        let callback = callback.clone();
        async move {
            let url = job.url.clone();
            let result = dispatch::save_image(job, timeout).await;
            if let Some(cb) = callback {
                match &result {
                    Ok(saved) => cb.on_image_complete(&saved.local_name),
                    Err(e) => cb.on_image_error(&display_url(&url), &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency);

    Ok((markdown_path, Box::pin(s)))
}

/// Convert `input_str`, write the Markdown file and stream the image
/// downloads.
pub async fn convert_stream(
    input_str: impl AsRef<str>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<(ConversionOutput, PathBuf, ImageStream), Page2MdError> {
    let output = convert(input_str, config).await?;
    let (path, images) = dispatch_stream(
        out_dir.as_ref(),
        &output.title,
        &output.markdown,
        &output.download_urls(),
        &output.download_map,
        config,
    )
    .await?;
    Ok((output, path, images))
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn markdown_written_before_images_stream() {
        let src = tempfile::tempdir().unwrap();
        let photo = src.path().join("a.png");
        std::fs::write(&photo, b"png").unwrap();
        let url = Url::from_file_path(&photo).unwrap().to_string();
        let gone = Url::from_file_path(src.path().join("b.png")).unwrap().to_string();

        let out = tempfile::tempdir().unwrap();
        let urls = vec![url.clone(), gone.clone()];
        let map = vec![(url, "a.png".to_string()), (gone, "b.png".to_string())];
        let (path, stream) = dispatch_stream(out.path(), "Doc", "body\n", &urls, &map, &ConversionConfig::default())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "body\n");

        let results: Vec<_> = stream.collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(out.path().join("Doc/a.png").exists());
    }
}
