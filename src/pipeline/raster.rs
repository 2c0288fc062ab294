//! Raster re-encoding: decode any supported image and write it back out as
//! PNG, JPEG or WebP.
//!
//! Runs entirely locally; the text service is never involved. Decoding and
//! encoding are CPU-bound, so [`reencode`] moves the work onto the blocking
//! pool.

use crate::error::ConvertError;
use crate::formats::Format;
use crate::output::DataUri;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Decode `bytes` and re-encode them for `target`.
///
/// Targets that are not images get PNG, the encoding a raster surface falls
/// back to when asked for one it does not know.
pub async fn reencode(bytes: Vec<u8>, target: Format) -> Result<DataUri, ConvertError> {
    tokio::task::spawn_blocking(move || reencode_blocking(&bytes, target))
        .await
        .map_err(|e| ConvertError::Internal(format!("Image task panicked: {}", e)))?
}

/// Synchronous body of [`reencode`].
pub fn reencode_blocking(bytes: &[u8], target: Format) -> Result<DataUri, ConvertError> {
    let img = image::load_from_memory(bytes).map_err(|e| ConvertError::ImageDecode {
        detail: e.to_string(),
    })?;
    debug!("Decoded {}x{} image", img.width(), img.height());

    let (format, mime) = output_encoding(target);
    let mut buf = Vec::new();
    // JPEG has no alpha channel; flatten before encoding.
    let raster = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    };
    raster
        .write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| ConvertError::ImageEncode {
            format: target.id().to_string(),
            detail: e.to_string(),
        })?;

    debug!("Re-encoded image → {} bytes {}", buf.len(), mime);
    Ok(DataUri::new(mime, buf))
}

/// `image` crate encoding and media type for a target.
fn output_encoding(target: Format) -> (ImageFormat, &'static str) {
    match target {
        Format::Jpeg => (ImageFormat::Jpeg, "image/jpeg"),
        Format::Webp => (ImageFormat::WebP, "image/webp"),
        _ => (ImageFormat::Png, "image/png"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_fixture() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([200, 30, 30, 128])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode fixture");
        buf
    }

    #[tokio::test]
    async fn png_to_jpeg() {
        let uri = reencode(png_fixture(), Format::Jpeg).await.unwrap();
        assert_eq!(uri.media_type(), "image/jpeg");
        assert_eq!(&uri.bytes()[..3], &[0xFF, 0xD8, 0xFF]);
        assert!(uri.to_string().starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn png_to_webp_keeps_dimensions() {
        let uri = reencode(png_fixture(), Format::Webp).await.unwrap();
        assert_eq!(uri.media_type(), "image/webp");
        let back = image::load_from_memory(uri.bytes()).unwrap();
        assert_eq!((back.width(), back.height()), (8, 6));
    }

    #[test]
    fn non_image_target_falls_back_to_png() {
        let uri = reencode_blocking(&png_fixture(), Format::Pdf).unwrap();
        assert_eq!(uri.media_type(), "image/png");
        assert!(uri.bytes().starts_with(b"\x89PNG"));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = reencode_blocking(b"definitely not an image", Format::Png).unwrap_err();
        assert!(matches!(err, ConvertError::ImageDecode { .. }));
    }
}
