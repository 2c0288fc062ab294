//! Conversion outcomes and the result normalizer.
//!
//! A conversion ends in one of two shapes: plain text (the service output for
//! text/code/data targets) or binary bytes (PDF/DOCX/XLSX documents and
//! re-encoded images). [`ConversionOutcome`] keeps the two apart in the type
//! system; [`normalize`] flattens either one into the canonical
//! `{content, is_binary, suggested_file_name}` record that is stored in
//! history and handed to callers.
//!
//! Binary payloads are carried as [`DataUri`]s so that a single `String`
//! column can hold every result, exactly as they are persisted.

use crate::error::ConvertError;
use crate::formats::Format;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use std::fmt;

/// Media types of the locally-produced binary formats.
pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Prefix of every suggested download file name.
pub const FILE_NAME_PREFIX: &str = "converted";

/// Binary content with its media type, rendered as `data:<mime>;base64,<…>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    media_type: String,
    bytes: Vec<u8>,
}

impl DataUri {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Parse a base64 data URI.
    ///
    /// Parameters between the media type and `;base64` (e.g.
    /// `;filename=x.pdf`) are accepted and dropped.
    pub fn parse(uri: &str) -> Result<Self, ConvertError> {
        let rest = uri.strip_prefix("data:").ok_or_else(|| ConvertError::InvalidDataUri {
            detail: "missing 'data:' prefix".into(),
        })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| ConvertError::InvalidDataUri {
            detail: "missing ',' separator".into(),
        })?;
        let mut params = header.split(';');
        let media_type = params.next().unwrap_or_default().to_string();
        if !params.any(|p| p == "base64") {
            return Err(ConvertError::InvalidDataUri {
                detail: "only base64 data URIs are supported".into(),
            });
        }
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| ConvertError::InvalidDataUri {
                detail: format!("bad base64 payload: {e}"),
            })?;
        Ok(Self { media_type, bytes })
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

/// Result of running the router on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Literal text. Never a `data:` URI.
    Text(String),
    /// Locally-encoded binary payload.
    Binary(DataUri),
}

impl ConversionOutcome {
    pub fn is_binary(&self) -> bool {
        matches!(self, ConversionOutcome::Binary(_))
    }

    /// Rebuild an outcome from its stored `(content, is_binary)` form.
    pub fn from_stored(content: &str, is_binary: bool) -> Result<Self, ConvertError> {
        if is_binary {
            DataUri::parse(content).map(ConversionOutcome::Binary)
        } else {
            Ok(ConversionOutcome::Text(content.to_string()))
        }
    }

    /// Content in its canonical string form.
    pub fn content(&self) -> String {
        match self {
            ConversionOutcome::Text(t) => t.clone(),
            ConversionOutcome::Binary(uri) => uri.to_string(),
        }
    }
}

/// Canonical, storable shape of a conversion result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResult {
    /// Literal text, or a base64 data URI when `is_binary`.
    pub content: String,
    pub is_binary: bool,
    pub suggested_file_name: String,
}

impl NormalizedResult {
    /// Bytes to write when saving the result to disk.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConvertError> {
        if self.is_binary {
            DataUri::parse(&self.content).map(DataUri::into_bytes)
        } else {
            Ok(self.content.clone().into_bytes())
        }
    }
}

/// Flatten an outcome into its canonical stored shape.
///
/// Pure: the same `(outcome, target, created_at)` always yields the same
/// result. The file name is `converted-<millis>.<extension>`.
pub fn normalize(
    outcome: &ConversionOutcome,
    target: Format,
    created_at: DateTime<Utc>,
) -> NormalizedResult {
    NormalizedResult {
        content: outcome.content(),
        is_binary: outcome.is_binary(),
        suggested_file_name: suggested_file_name(target, created_at),
    }
}

pub fn suggested_file_name(target: Format, created_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}.{}",
        FILE_NAME_PREFIX,
        created_at.timestamp_millis(),
        target.extension()
    )
}
