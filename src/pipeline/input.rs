//! Intake: turn a user-supplied path or URL into an [`Upload`].
//!
//! The content is sniffed rather than trusted by extension: image magic bytes
//! win, then the `%PDF` signature, and everything else is read as (lossy)
//! UTF-8 text whose source format is guessed from the file extension. Text
//! with an unrecognised extension is left as `auto` for the orchestrator's
//! detection step.

use crate::error::ConvertError;
use crate::formats::{Format, SourceFormat};
use crate::output::PDF_MIME;
use crate::request::{ConversionRequest, Payload};
use image::ImageFormat;
use std::path::Path;
use tracing::{debug, info};

/// Content loaded from disk or the network, not yet tied to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: Option<String>,
    /// Source format implied by the content or its extension.
    pub source: SourceFormat,
    pub payload: Payload,
}

impl Upload {
    /// Build a request, letting an explicit `--from` override the sniffed
    /// source.
    pub fn into_request(self, target: Format, source: Option<SourceFormat>) -> ConversionRequest {
        ConversionRequest {
            file_name: self.file_name,
            source: source.unwrap_or(self.source),
            target,
            payload: self.payload,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_upload(input: &str, timeout_secs: u64) -> Result<Upload, ConvertError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Classify raw bytes.
pub fn sniff(file_name: Option<String>, bytes: Vec<u8>) -> Upload {
    if let Some(format) = sniff_image(&bytes) {
        debug!("Sniffed {:?} image ({} bytes)", format, bytes.len());
        let source = match format {
            ImageFormat::Png => SourceFormat::Known(Format::Png),
            ImageFormat::Jpeg => SourceFormat::Known(Format::Jpeg),
            ImageFormat::WebP => SourceFormat::Known(Format::Webp),
            _ => SourceFormat::Auto,
        };
        return Upload {
            file_name,
            source,
            payload: Payload::Binary {
                bytes,
                media_type: format.to_mime_type().to_string(),
            },
        };
    }

    if bytes.starts_with(b"%PDF") {
        debug!("Sniffed PDF ({} bytes)", bytes.len());
        return Upload {
            file_name,
            source: SourceFormat::Known(Format::Pdf),
            payload: Payload::Binary {
                bytes,
                media_type: PDF_MIME.to_string(),
            },
        };
    }

    let source = file_name
        .as_deref()
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .and_then(Format::from_extension)
        .map(SourceFormat::Known)
        .unwrap_or(SourceFormat::Auto);
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    Upload {
        file_name,
        source,
        payload: Payload::Text(text),
    }
}

/// Raster formats this build can decode.
fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(bytes) {
        Ok(
            f @ (ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::WebP
            | ImageFormat::Gif
            | ImageFormat::Bmp),
        ) => Some(f),
        _ => None,
    }
}

async fn read_local(path: &Path) -> Result<Upload, ConvertError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ConvertError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ConvertError::InputNotFound {
            path: path.to_path_buf(),
        },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    Ok(sniff(file_name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, ConvertError> {
    info!("Downloading from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(sniff(file_name_from_url(url), bytes.to_vec()))
}

/// Last non-empty path segment of the URL, if it looks like a file name.
fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() || !last.contains('.') {
        return None;
    }
    Some(last.to_string())
}
