//! Download Dispatch: persist a conversion to disk.
//!
//! ```text
//! <out_dir>/<title>.md
//! <out_dir>/<title>/<local name>   one per mapped image
//! ```
//!
//! The Markdown file is written atomically (temp file + rename) so a crash
//! never leaves a truncated document. Images are fetched concurrently and
//! independently: a failed image is recorded and the rest carry on.

use crate::config::ConversionConfig;
use crate::error::{ItemError, Page2MdError};
use crate::output::{DownloadReport, SavedImage};
use crate::pipeline::{encode, input, sanitize};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// One image to save.
#[derive(Debug, Clone)]
pub(crate) struct DownloadJob {
    pub index: usize,
    pub url: String,
    pub local_name: String,
    pub path: PathBuf,
}

/// Short form of a source for logs and reports; data URLs are truncated.
pub fn display_url(url: &str) -> String {
    if encode::is_data_url(url) && url.len() > 48 {
        let cut = url.char_indices().nth(40).map(|(i, _)| i).unwrap_or(url.len());
        format!("{}…", &url[..cut])
    } else {
        url.to_string()
    }
}

/// Write `<out_dir>/<title>.md` atomically. Returns its path.
pub async fn write_markdown(out_dir: &Path, title: &str, markdown: &str) -> Result<PathBuf, Page2MdError> {
    let title = sanitize::sanitize_filename(title);
    let path = out_dir.join(format!("{}.md", title));

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| Page2MdError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(|e| Page2MdError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| Page2MdError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Pair every URL with its local names and target paths; URLs without a
/// local name are skipped.
///
/// A URL may carry several local names: two drawings that rasterise to the
/// same PNG share a data URL but keep their own files. Each name becomes its
/// own job.
pub(crate) fn plan_downloads(
    out_dir: &Path,
    title: &str,
    image_urls: &[String],
    url_to_local: &[(String, String)],
) -> Vec<DownloadJob> {
    let folder = out_dir.join(sanitize::sanitize_filename(title));
    let mut names: HashMap<&str, Vec<&str>> = HashMap::new();
    for (url, local) in url_to_local {
        names.entry(url.as_str()).or_default().push(local.as_str());
    }

    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for url in image_urls.iter().filter(|u| seen.insert(u.as_str())) {
        let Some(locals) = names.get(url.as_str()) else {
            debug!("No local name for {}; skipping", display_url(url));
            continue;
        };
        for &local in locals {
            jobs.push(DownloadJob {
                index: jobs.len(),
                url: url.clone(),
                local_name: local.to_string(),
                path: folder.join(local),
            });
        }
    }
    jobs
}

async fn read_source(url: &str, timeout: Duration) -> Result<Vec<u8>, String> {
    if encode::is_data_url(url) {
        return encode::decode_data_url(url)
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| "malformed data URL".to_string());
    }
    let parsed = Url::parse(url).map_err(|e| e.to_string())?;
    input::fetch_bytes(&parsed, timeout).await.map_err(|e| e.to_string())
}

/// Fetch one image and write it to its target path.
pub(crate) async fn save_image(job: DownloadJob, timeout: Duration) -> Result<SavedImage, ItemError> {
    let bytes = read_source(&job.url, timeout)
        .await
        .map_err(|detail| ItemError::DownloadFailed {
            url: display_url(&job.url),
            detail,
        })?;

    let write_err = |e: std::io::Error| ItemError::WriteFailed {
        path: job.path.display().to_string(),
        detail: e.to_string(),
    };
    if let Some(parent) = job.path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(&job.path, &bytes).await.map_err(write_err)?;

    Ok(SavedImage {
        url: display_url(&job.url),
        local_name: job.local_name,
        path: job.path,
        bytes: bytes.len(),
    })
}

/// Write the Markdown document and download every mapped image.
///
/// Only failing to write the Markdown file is fatal; image failures end up
/// in [`DownloadReport::failed`].
pub async fn dispatch(
    out_dir: &Path,
    title: &str,
    markdown: &str,
    image_urls: &[String],
    url_to_local: &[(String, String)],
    config: &ConversionConfig,
) -> Result<DownloadReport, Page2MdError> {
    let markdown_path = write_markdown(out_dir, title, markdown).await?;
    let jobs = plan_downloads(out_dir, title, image_urls, url_to_local);
    let total = jobs.len();
    info!("Dispatching {} images to {}", total, out_dir.display());

    if let Some(ref cb) = config.progress_callback {
        cb.on_download_start(total);
    }

    let timeout = config.fetch_timeout();
    let mut results: Vec<(usize, Result<SavedImage, ItemError>)> = stream::iter(jobs.into_iter().map(|job| {
        let index = job.index;
        let url = job.url.clone();
        async move {
            let result = save_image(job, timeout).await;
            if let Some(ref cb) = config.progress_callback {
                match &result {
                    Ok(saved) => cb.on_image_complete(&saved.local_name),
                    Err(e) => cb.on_image_error(&display_url(&url), &e.to_string()),
                }
            }
            (index, result)
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;
    results.sort_by_key(|(index, _)| *index);

    let mut report = DownloadReport {
        markdown_path,
        saved: Vec::new(),
        failed: Vec::new(),
    };
    for (_, result) in results {
        match result {
            Ok(saved) => report.saved.push(saved),
            Err(e) => {
                warn!("{}", e);
                report.failed.push(e);
            }
        }
    }

    info!("Saved {}/{} images", report.saved.len(), total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(report.saved.len());
    }
    Ok(report)
}
