//! Conversion requests: what to convert, from what, into what.

use crate::formats::{Format, SourceFormat};
use std::borrow::Cow;

/// Content kind derived from a payload; picks the image path or the text path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
}

/// The uploaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Textual content, already decoded.
    Text(String),
    /// Raw bytes with the media type they were sniffed or declared as.
    Binary { bytes: Vec<u8>, media_type: String },
}

impl Payload {
    /// `Image` iff the payload is binary with an `image/*` media type.
    pub fn content_kind(&self) -> ContentKind {
        match self {
            Payload::Binary { media_type, .. } if media_type.starts_with("image/") => {
                ContentKind::Image
            }
            _ => ContentKind::Text,
        }
    }

    /// Payload as text; binary content is decoded lossily.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(t) => Cow::Borrowed(t.as_str()),
            Payload::Binary { bytes, .. } => String::from_utf8_lossy(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(t) => t.len(),
            Payload::Binary { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One conversion attempt's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Original file name, if the content came from a named file.
    pub file_name: Option<String>,
    pub source: SourceFormat,
    pub target: Format,
    pub payload: Payload,
}

impl ConversionRequest {
    /// Request for textual content.
    pub fn text(source: SourceFormat, target: Format, content: impl Into<String>) -> Self {
        Self {
            file_name: None,
            source,
            target,
            payload: Payload::Text(content.into()),
        }
    }

    /// Request for binary content of the given media type.
    pub fn binary(
        source: SourceFormat,
        target: Format,
        bytes: Vec<u8>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            file_name: None,
            source,
            target,
            payload: Payload::Binary {
                bytes,
                media_type: media_type.into(),
            },
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn content_kind(&self) -> ContentKind {
        self.payload.content_kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_media_type_is_image_kind() {
        let req = ConversionRequest::binary(
            SourceFormat::Known(Format::Png),
            Format::Jpeg,
            vec![0x89, b'P'],
            "image/png",
        );
        assert_eq!(req.content_kind(), ContentKind::Image);
    }

    #[test]
    fn pdf_bytes_are_text_kind() {
        let req = ConversionRequest::binary(
            SourceFormat::Known(Format::Pdf),
            Format::Markdown,
            b"%PDF-1.7".to_vec(),
            "application/pdf",
        );
        assert_eq!(req.content_kind(), ContentKind::Text);
        assert_eq!(req.payload.as_text(), "%PDF-1.7");
    }

    #[test]
    fn text_request_defaults() {
        let req = ConversionRequest::text(SourceFormat::Auto, Format::Yaml, "{}")
            .with_file_name("a.json");
        assert_eq!(req.file_name.as_deref(), Some("a.json"));
        assert_eq!(req.content_kind(), ContentKind::Text);
        assert_eq!(req.payload.len(), 2);
    }
}
