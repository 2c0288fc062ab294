//! The fixed format catalog.
//!
//! Every format the converter understands is a variant of [`Format`]; the
//! catalog is a `static` slice of [`FormatDescriptor`]s in a stable display
//! order. There is no registration API; adding a format means adding a
//! variant, which makes every `match` over formats fail to compile until the
//! new case is handled.

use crate::error::ConvertError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Coarse category used to pick a conversion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Text,
    Code,
    Data,
    Document,
    Image,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormatKind::Text => "text",
            FormatKind::Code => "code",
            FormatKind::Data => "data",
            FormatKind::Document => "document",
            FormatKind::Image => "image",
        };
        f.write_str(s)
    }
}

/// A supported format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Xml,
    Csv,
    Xlsx,
    Pdf,
    Docx,
    Markdown,
    Html,
    Txt,
    Python,
    Javascript,
    Typescript,
    Rust,
    Png,
    Jpeg,
    Webp,
}

/// Static description of one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub format: Format,
    /// Symbolic id, unique across the catalog.
    pub id: &'static str,
    pub label: &'static str,
    pub kind: FormatKind,
    /// File extension (without the dot) used for downloads.
    pub extension: &'static str,
}

const fn entry(
    format: Format,
    id: &'static str,
    label: &'static str,
    kind: FormatKind,
    extension: &'static str,
) -> FormatDescriptor {
    FormatDescriptor {
        format,
        id,
        label,
        kind,
        extension,
    }
}

static CATALOG: [FormatDescriptor; 17] = [
    entry(Format::Json, "json", "JSON", FormatKind::Data, "json"),
    entry(Format::Yaml, "yaml", "YAML", FormatKind::Data, "yaml"),
    entry(Format::Xml, "xml", "XML", FormatKind::Data, "xml"),
    entry(Format::Csv, "csv", "CSV", FormatKind::Data, "csv"),
    entry(Format::Xlsx, "xlsx", "Excel (XLSX)", FormatKind::Document, "xlsx"),
    entry(Format::Pdf, "pdf", "PDF Document", FormatKind::Document, "pdf"),
    entry(Format::Docx, "docx", "Word (DOCX)", FormatKind::Document, "docx"),
    entry(Format::Markdown, "markdown", "Markdown", FormatKind::Text, "md"),
    entry(Format::Html, "html", "HTML", FormatKind::Text, "html"),
    entry(Format::Txt, "txt", "Plain Text", FormatKind::Text, "txt"),
    entry(Format::Python, "python", "Python", FormatKind::Code, "py"),
    entry(Format::Javascript, "javascript", "JavaScript", FormatKind::Code, "js"),
    entry(Format::Typescript, "typescript", "TypeScript", FormatKind::Code, "ts"),
    entry(Format::Rust, "rust", "Rust", FormatKind::Code, "rs"),
    entry(Format::Png, "png", "PNG", FormatKind::Image, "png"),
    entry(Format::Jpeg, "jpeg", "JPEG", FormatKind::Image, "jpg"),
    entry(Format::Webp, "webp", "WebP", FormatKind::Image, "webp"),
];

/// The full catalog in stable display order.
pub fn list() -> &'static [FormatDescriptor] {
    &CATALOG
}

/// Look up the kind of a format by its catalog id.
///
/// Only exact ids are accepted; aliases such as `md` or `jpg` are a parsing
/// convenience of [`Format::from_str`], not catalog ids.
pub fn kind_of(id: &str) -> Result<FormatKind, ConvertError> {
    CATALOG
        .iter()
        .find(|d| d.id == id)
        .map(|d| d.kind)
        .ok_or_else(|| ConvertError::UnknownFormat { id: id.to_string() })
}

impl Format {
    pub fn descriptor(self) -> &'static FormatDescriptor {
        // CATALOG is indexed in declaration order of the enum.
        &CATALOG[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.descriptor().id
    }

    pub fn label(self) -> &'static str {
        self.descriptor().label
    }

    pub fn kind(self) -> FormatKind {
        self.descriptor().kind
    }

    pub fn extension(self) -> &'static str {
        self.descriptor().extension
    }

    pub fn is_image(self) -> bool {
        self.kind() == FormatKind::Image
    }

    /// PDF, DOCX and XLSX: built locally from a markdown intermediate.
    pub fn is_binary_document(self) -> bool {
        matches!(self, Format::Pdf | Format::Docx | Format::Xlsx)
    }

    /// Guess a format from a file extension (`.md`, `.py`, `.jpg`, …).
    pub fn from_extension(ext: &str) -> Option<Format> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if let Some(d) = CATALOG.iter().find(|d| d.extension == ext) {
            return Some(d.format);
        }
        ext.parse().ok()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        if let Some(d) = CATALOG.iter().find(|d| d.id == needle) {
            return Ok(d.format);
        }
        let aliased = match needle.as_str() {
            "md" => Format::Markdown,
            "yml" => Format::Yaml,
            "text" | "plaintext" | "plain" => Format::Txt,
            "htm" => Format::Html,
            "py" => Format::Python,
            "js" => Format::Javascript,
            "ts" => Format::Typescript,
            "rs" => Format::Rust,
            "jpg" => Format::Jpeg,
            "excel" => Format::Xlsx,
            "word" => Format::Docx,
            _ => {
                return Err(ConvertError::UnknownFormat {
                    id: s.trim().to_string(),
                })
            }
        };
        Ok(aliased)
    }
}

/// Source format of a request: a catalog format, or `auto` for detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    #[default]
    Auto,
    Known(Format),
}

impl SourceFormat {
    /// Label recorded in history when the attempt starts.
    pub fn history_label(&self) -> String {
        match self {
            SourceFormat::Auto => "Detected".to_string(),
            SourceFormat::Known(f) => f.id().to_string(),
        }
    }

    pub fn known(&self) -> Option<Format> {
        match self {
            SourceFormat::Auto => None,
            SourceFormat::Known(f) => Some(*f),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(SourceFormat::Auto)
        } else {
            s.parse().map(SourceFormat::Known)
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Auto => f.write_str("auto"),
            SourceFormat::Known(format) => format.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_order_matches_enum() {
        for (i, d) in list().iter().enumerate() {
            assert_eq!(d.format as usize, i, "catalog out of order at {}", d.id);
        }
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = list().iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), list().len());
    }

    #[test]
    fn list_is_stable() {
        let first: Vec<_> = list().iter().map(|d| d.id).collect();
        let second: Vec<_> = list().iter().map(|d| d.id).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], "json");
        assert_eq!(first[16], "webp");
    }

    #[test]
    fn kind_of_known_ids() {
        assert_eq!(kind_of("json").unwrap(), FormatKind::Data);
        assert_eq!(kind_of("pdf").unwrap(), FormatKind::Document);
        assert_eq!(kind_of("markdown").unwrap(), FormatKind::Text);
        assert_eq!(kind_of("rust").unwrap(), FormatKind::Code);
        assert_eq!(kind_of("webp").unwrap(), FormatKind::Image);
    }

    #[test]
    fn kind_of_unknown_id_fails() {
        let err = kind_of("toml").unwrap_err();
        assert!(matches!(err, ConvertError::UnknownFormat { ref id } if id == "toml"));
    }

    #[test]
    fn kind_of_rejects_aliases() {
        for alias in ["md", "yml", "jpg", "py", "JSON"] {
            assert!(
                matches!(kind_of(alias), Err(ConvertError::UnknownFormat { .. })),
                "{alias} is not a catalog id"
            );
        }
    }

    #[test]
    fn aliases_and_case() {
        assert_eq!("MD".parse::<Format>().unwrap(), Format::Markdown);
        assert_eq!(" yml ".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("jpg".parse::<Format>().unwrap(), Format::Jpeg);
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
    }

    #[test]
    fn binary_documents() {
        let docs: Vec<_> = list()
            .iter()
            .filter(|d| d.format.is_binary_document())
            .map(|d| d.id)
            .collect();
        assert_eq!(docs, vec!["xlsx", "pdf", "docx"]);
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(Format::from_extension("md"), Some(Format::Markdown));
        assert_eq!(Format::from_extension(".py"), Some(Format::Python));
        assert_eq!(Format::from_extension("JPG"), Some(Format::Jpeg));
        assert_eq!(Format::from_extension("jpeg"), Some(Format::Jpeg));
        assert_eq!(Format::from_extension("exe"), None);
        assert_eq!(Format::Markdown.extension(), "md");
    }

    #[test]
    fn source_format_parsing() {
        assert_eq!("auto".parse::<SourceFormat>().unwrap(), SourceFormat::Auto);
        assert_eq!(
            "csv".parse::<SourceFormat>().unwrap(),
            SourceFormat::Known(Format::Csv)
        );
        assert_eq!(SourceFormat::Auto.history_label(), "Detected");
        assert_eq!(SourceFormat::Known(Format::Csv).history_label(), "csv");
    }
}
