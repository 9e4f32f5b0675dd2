//! Input resolution: normalise a user-supplied path or URL to page markup
//! plus the absolute URL it lives at.
//!
//! ## Why always carry a URL?
//!
//! Every later stage resolves relative references (`<img src>`, `<a href>`,
//! frame `src`, linked `.svg`) against the page URL, and frame capture
//! compares origins. A local file therefore gets a `file://` URL instead of a
//! bare path, so the rest of the pipeline has one code path for both.
//!
//! The same module provides [`fetch_text`] and [`fetch_bytes`], used for frame
//! documents, linked SVGs and image downloads over `http`, `https` and `file`.

use crate::error::Page2MdError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Page markup and the URL it was loaded from.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub html: String,
    /// Final URL after redirects (or the `file://` URL of a local file).
    pub url: Url,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to page markup.
///
/// If the input is a URL, fetch it. If the input is a local file, validate
/// it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PageSource, Page2MdError> {
    if is_url(input) {
        let url = Url::parse(input).map_err(|_| Page2MdError::InvalidInput {
            input: input.to_string(),
        })?;
        info!("Fetching page: {}", url);
        let (body, final_url) = fetch_http(&url, Duration::from_secs(timeout_secs)).await?;
        Ok(PageSource {
            html: String::from_utf8_lossy(&body).into_owned(),
            url: final_url,
        })
    } else if input.trim().is_empty() {
        Err(Page2MdError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        resolve_local(input).await
    }
}

/// Read a local HTML file and build its `file://` URL.
async fn resolve_local(path_str: &str) -> Result<PageSource, Page2MdError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Page2MdError::FileNotFound { path });
    }

    let bytes = read_file(&path).await?;
    let absolute = std::fs::canonicalize(&path).map_err(|_| Page2MdError::FileNotFound {
        path: path.clone(),
    })?;
    let url = Url::from_file_path(&absolute).map_err(|_| Page2MdError::InvalidInput {
        input: path_str.to_string(),
    })?;

    debug!("Resolved local page: {}", absolute.display());
    Ok(PageSource {
        html: String::from_utf8_lossy(&bytes).into_owned(),
        url,
    })
}

async fn read_file(path: &PathBuf) -> Result<Vec<u8>, Page2MdError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Page2MdError::PermissionDenied { path: path.clone() },
        std::io::ErrorKind::NotFound => Page2MdError::FileNotFound { path: path.clone() },
        _ => Page2MdError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })
}

/// Fetch a resource over `http`, `https` or `file`.
pub async fn fetch_bytes(url: &Url, timeout: Duration) -> Result<Vec<u8>, Page2MdError> {
    match url.scheme() {
        "http" | "https" => fetch_http(url, timeout).await.map(|(body, _)| body),
        "file" => {
            let path = url.to_file_path().map_err(|_| Page2MdError::InvalidInput {
                input: url.to_string(),
            })?;
            read_file(&path).await
        }
        other => Err(Page2MdError::FetchFailed {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Fetch a resource and decode it as (lossy) UTF-8.
pub async fn fetch_text(url: &Url, timeout: Duration) -> Result<String, Page2MdError> {
    let bytes = fetch_bytes(url, timeout).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// GET a URL; returns the body and the final URL after redirects.
async fn fetch_http(url: &Url, timeout: Duration) -> Result<(Vec<u8>, Url), Page2MdError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("page2md/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Page2MdError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Page2MdError::FetchTimeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            }
        } else {
            Page2MdError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url.clone()).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(Page2MdError::FetchFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let final_url = response.url().clone();
    let bytes = response.bytes().await.map_err(map_err)?;
    debug!("Fetched {} ({} bytes)", final_url, bytes.len());
    Ok((bytes.to_vec(), final_url))
}
