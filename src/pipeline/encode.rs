//! Image encoding: pixmaps → PNG bytes → `data:` URLs, and back.
//!
//! Rasterised drawings have no remote URL. They travel through the URL map
//! and Download Dispatch as `data:image/png;base64,…` identifiers, the same
//! way a browser would hand a canvas export to its download manager.
//! PNG is lossless, which keeps thin chart strokes and axis labels crisp.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, RgbaImage};
use percent_encoding::percent_decode_str;
use std::io::Cursor;
use tracing::debug;

const DATA_PREFIX: &str = "data:";

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img.clone()).write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Wrap bytes into a base64 `data:` URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a `data:` URL into its MIME type and bytes.
///
/// Payloads are percent-decoded first, then base64-decoded when the header
/// says so. Returns `None` for anything that is not a well-formed `data:` URL.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix(DATA_PREFIX)?;
    let (header, payload) = rest.split_once(',')?;
    let (mime, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let mime = mime.split(';').next().unwrap_or("").trim();
    let mime = if mime.is_empty() { "text/plain" } else { mime };
    let raw: Vec<u8> = percent_decode_str(payload).collect();
    let bytes = if is_base64 {
        let text: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        STANDARD.decode(text).ok()?
    } else {
        raw
    };
    Some((mime.to_string(), bytes))
}

pub fn is_data_url(url: &str) -> bool {
    url.get(..DATA_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(DATA_PREFIX))
}
