//! Document encoding: markdown text → PDF / DOCX / XLSX bytes.
//!
//! The text service always answers in markdown for document targets; these
//! encoders lay that text out as-is, they do not render markdown. Each
//! encoder is a pure `(text) -> bytes` function, so the router runs them on
//! the blocking pool and tests call them directly.
//!
//! | Target | Layout |
//! |--------|--------|
//! | PDF | A4, Helvetica 11 pt, 10 mm margins, word-wrapped, paginated |
//! | DOCX | one paragraph per line |
//! | XLSX | sheet `ConvertedData`, one row per line, comma-separated cells |

use crate::error::ConvertError;
use crate::formats::Format;
use crate::output::{DataUri, DOCX_MIME, PDF_MIME, XLSX_MIME};
use docx_rs::{Docx, Paragraph, Run};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::io::Cursor;
use tracing::{debug, warn};

/// Name of the single worksheet in generated workbooks.
pub const SHEET_NAME: &str = "ConvertedData";

/// Longest string a single XLSX cell accepts.
const XLSX_CELL_MAX_CHARS: usize = 32_767;

// ── PDF layout ──────────────────────────────────────────────────────────────

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 10.0;
const FONT_SIZE_PT: f32 = 11.0;
const LINE_HEIGHT_MM: f32 = 5.0;
/// Helvetica 11 pt fits roughly this many average characters in 190 mm.
const WRAP_COLUMNS: usize = 90;
const TAB_WIDTH: usize = 4;

/// Encode `text` into the binary document format `target`.
///
/// Returns `Internal` when `target` is not PDF, DOCX or XLSX; the router only
/// calls this for those three.
pub fn encode_document(target: Format, text: &str) -> Result<DataUri, ConvertError> {
    let (mime, bytes) = match target {
        Format::Pdf => (PDF_MIME, encode_pdf(text)?),
        Format::Docx => (DOCX_MIME, encode_docx(text)?),
        Format::Xlsx => (XLSX_MIME, encode_xlsx(text)?),
        other => {
            return Err(ConvertError::Internal(format!(
                "'{}' is not a document format",
                other
            )))
        }
    };
    debug!("Encoded {} → {} bytes", target, bytes.len());
    Ok(DataUri::new(mime, bytes))
}

/// Lay `text` out on A4 pages.
pub fn encode_pdf(text: &str) -> Result<Vec<u8>, ConvertError> {
    let pdf_err = |e: printpdf::Error| ConvertError::DocumentEncode {
        format: "pdf".into(),
        detail: e.to_string(),
    };

    let lines = wrap_lines(text, WRAP_COLUMNS);
    let usable_height = PAGE_HEIGHT_MM - 2.0 * MARGIN_MM;
    let lines_per_page = ((usable_height / LINE_HEIGHT_MM) as usize).max(1);

    let (doc, first_page, first_layer) = PdfDocument::new(
        "Converted document",
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;

    let mut chunks: Vec<&[String]> = lines.chunks(lines_per_page).collect();
    if chunks.is_empty() {
        // An empty document still gets its first (blank) page.
        chunks.push(&[]);
    }

    let top = PAGE_HEIGHT_MM - MARGIN_MM - LINE_HEIGHT_MM;
    for (i, chunk) in chunks.iter().enumerate() {
        let (page, layer) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1")
        };
        let layer = doc.get_page(page).get_layer(layer);
        for (n, line) in chunk.iter().enumerate() {
            let y = top - n as f32 * LINE_HEIGHT_MM;
            layer.use_text(line.as_str(), FONT_SIZE_PT, Mm(MARGIN_MM), Mm(y), &font);
        }
    }
    debug!("PDF: {} lines over {} pages", lines.len(), chunks.len());

    doc.save_to_bytes().map_err(pdf_err)
}

/// One paragraph per input line; blank lines become empty paragraphs.
pub fn encode_docx(text: &str) -> Result<Vec<u8>, ConvertError> {
    let docx = text.split('\n').fold(Docx::new(), |docx, line| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)))
    });

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| ConvertError::DocumentEncode {
            format: "docx".into(),
            detail: e.to_string(),
        })?;
    Ok(buf.into_inner())
}

/// How text is placed on the worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetLayout {
    /// One row per line, one cell per comma-separated field.
    Rows(Vec<Vec<String>>),
    /// The whole text in cell A1.
    SingleCell(String),
}

/// Parse `text` as comma-separated rows.
///
/// Any record that fails to parse, or has a different field count than the
/// first one, puts the whole text in a single cell instead.
pub fn sheet_layout(text: &str) -> SheetLayout {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => {
                warn!("Text is not consistent comma-separated rows ({}); using a single cell", e);
                return SheetLayout::SingleCell(text.to_string());
            }
        }
    }
    SheetLayout::Rows(rows)
}

/// Write `text` to a one-sheet workbook; never fails on malformed rows.
pub fn encode_xlsx(text: &str) -> Result<Vec<u8>, ConvertError> {
    let layout = sheet_layout(text);
    let built = match &layout {
        SheetLayout::Rows(rows) => build_workbook(rows).or_else(|e| {
            warn!("Sheet rejected row layout ({}); using a single cell", e);
            build_single_cell(text)
        }),
        SheetLayout::SingleCell(t) => build_single_cell(t),
    };
    built.map_err(|e| ConvertError::DocumentEncode {
        format: "xlsx".into(),
        detail: e.to_string(),
    })
}

fn build_workbook(rows: &[Vec<String>]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        for (r, row) in rows.iter().enumerate() {
            let r = u32::try_from(r).map_err(|_| XlsxError::RowColumnLimitError)?;
            for (c, cell) in row.iter().enumerate() {
                let c = u16::try_from(c).map_err(|_| XlsxError::RowColumnLimitError)?;
                sheet.write_string(r, c, cell.as_str())?;
            }
        }
    }
    workbook.save_to_buffer()
}

fn build_single_cell(text: &str) -> Result<Vec<u8>, XlsxError> {
    let cell = match text.char_indices().nth(XLSX_CELL_MAX_CHARS) {
        Some((idx, _)) => {
            warn!(
                "Text exceeds {} characters; truncating single cell",
                XLSX_CELL_MAX_CHARS
            );
            &text[..idx]
        }
        None => text,
    };
    build_workbook(&[vec![cell.to_string()]])
}

/// Expand tabs, drop glyphs Helvetica cannot show and wrap at `width`
/// columns, breaking on spaces where possible.
fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let line: String = raw
            .replace('\t', &" ".repeat(TAB_WIDTH))
            .chars()
            .map(|c| if (c as u32) < 0x100 { c } else { '?' })
            .collect();

        let mut rest = line.as_str();
        while rest.chars().count() > width {
            let hard = rest
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let split = if rest[hard..].starts_with(' ') {
                hard
            } else {
                rest[..hard].rfind(' ').filter(|&i| i > 0).unwrap_or(hard)
            };
            out.push(rest[..split].trim_end().to_string());
            rest = rest[split..].trim_start();
        }
        out.push(rest.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_has_magic_bytes() {
        let bytes = encode_pdf("# Report\n\n| a | b |\n| 1 | 2 |").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn pdf_of_empty_text_is_valid() {
        let bytes = encode_pdf("").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_text_paginates() {
        let text = (0..200).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let one_page = encode_pdf("line 0").unwrap();
        let many_pages = encode_pdf(&text).unwrap();
        assert!(many_pages.len() > one_page.len());
    }

    #[test]
    fn docx_is_a_zip() {
        let bytes = encode_docx("Title\n\nBody line").unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn xlsx_is_a_zip() {
        let bytes = encode_xlsx("a,b\n1,2").unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn consistent_rows_are_split_into_cells() {
        assert_eq!(
            sheet_layout("name,age\nada,36\n"),
            SheetLayout::Rows(vec![
                vec!["name".to_string(), "age".to_string()],
                vec!["ada".to_string(), "36".to_string()],
            ])
        );
    }

    #[test]
    fn quoted_commas_stay_in_one_cell() {
        match sheet_layout("city,note\nParis,\"big, old\"") {
            SheetLayout::Rows(rows) => assert_eq!(rows[1][1], "big, old"),
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_rows_fall_back_to_single_cell() {
        let text = "| a | b |\nsome prose, with a comma\nno comma";
        assert_eq!(sheet_layout(text), SheetLayout::SingleCell(text.to_string()));
        // Still produces a workbook.
        assert!(encode_xlsx(text).unwrap().starts_with(b"PK"));
    }

    #[test]
    fn encode_document_sets_mime() {
        let uri = encode_document(Format::Docx, "x").unwrap();
        assert_eq!(uri.media_type(), DOCX_MIME);
        assert!(uri.to_string().starts_with("data:application/vnd.openxml"));
    }

    #[test]
    fn encode_document_rejects_text_targets() {
        assert!(matches!(
            encode_document(Format::Yaml, "a: 1"),
            Err(ConvertError::Internal(_))
        ));
    }

    #[test]
    fn wrap_breaks_on_spaces() {
        let lines = wrap_lines("aaa bbb ccc", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc"]);
    }

    #[test]
    fn wrap_hard_breaks_long_words() {
        let lines = wrap_lines("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn wrap_expands_tabs_and_replaces_wide_glyphs() {
        let lines = wrap_lines("\tx 日本", 90);
        assert_eq!(lines, vec!["    x ??"]);
    }
}
