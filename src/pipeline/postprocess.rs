//! Post-processing: deterministic cleanup of LLM-generated text.
//!
//! Even well-prompted models wrap their answer in ` ```json … ``` ` fences,
//! emit `\r\n` line endings or sprinkle zero-width characters through the
//! output. Those artefacts would end up inside a `.yaml` download or a PDF
//! page, so every service answer goes through [`clean_output`] before it is
//! used.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw answer once; markdown-only rules run last because they work
//! line by line on already-normalised text.

use crate::formats::Format;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a text-service answer for the given target.
///
/// Every target: outer code fences are stripped whatever language tag they
/// carry, line endings become LF, invisible Unicode (zero-width spaces, BOM,
/// soft hyphens) is dropped and each line loses its trailing whitespace.
///
/// Markdown (the target itself or the document intermediate) additionally
/// gets runs of blank lines capped at two and its pipe tables repaired so
/// each has exactly one delimiter row, right after the header.
///
/// Finally the text ends with exactly one newline; an answer that is empty
/// after cleanup stays empty so callers can treat it as "no usable text".
pub fn clean_output(input: &str, target: Format) -> String {
    let mut text = normalise_lines(&strip_code_fences(input));
    if target == Format::Markdown {
        text = repair_tables(&limit_blank_runs(&text));
    }
    match text.trim_end() {
        "" => String::new(),
        body => format!("{body}\n"),
    }
}

/// Map a free-form detection answer to a catalog format.
///
/// Models answer "JSON", "`yaml`", "python code", "The format is: python."
/// and so on; the last word-like token that names a catalog format (or one
/// of its aliases) wins.
pub fn parse_detected_format(answer: &str) -> Option<Format> {
    let cleaned = strip_code_fences(answer).to_ascii_lowercase();
    cleaned
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .filter_map(|token| token.parse::<Format>().ok())
        .last()
}

// ── Fences ──────────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[\w.+#-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        // A fenced answer that itself contains fences is real content.
        if !caps[1].contains("\n```") {
            return caps[1].to_string();
        }
    }
    input.to_string()
}

// ── Line hygiene ────────────────────────────────────────────────────────────

const INVISIBLE: [char; 6] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

fn normalise_lines(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .split(['\n', '\r'])
        .map(|line| {
            line.chars()
                .filter(|c| !INVISIBLE.contains(c))
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Markdown: blank runs ────────────────────────────────────────────────────

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n){3,}").unwrap());

fn limit_blank_runs(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

// ── Markdown: pipe tables ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableLine {
    /// A `| a | b |` row with this many cells.
    Row(usize),
    /// A `| --- | :-: |` delimiter row.
    Delimiter,
    Text,
}

fn classify(line: &str) -> TableLine {
    let t = line.trim();
    if t.len() <= 2 || !t.starts_with('|') || !t.ends_with('|') {
        return TableLine::Text;
    }
    let is_delimiter = t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '));
    if is_delimiter {
        TableLine::Delimiter
    } else {
        TableLine::Row(t.matches('|').count().saturating_sub(1).max(1))
    }
}

/// Make every pipe table valid GFM: exactly one delimiter row, right after
/// the header. A missing delimiter is synthesised from the header's cell
/// count; delimiters anywhere else in the table are dropped.
fn repair_tables(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    // Table rows seen so far in the current table, and the header's width.
    let mut seen = 0usize;
    let mut header_cells = 0usize;

    for line in input.lines() {
        match classify(line) {
            TableLine::Text => {
                seen = 0;
                out.push(line.to_string());
            }
            TableLine::Delimiter => {
                if seen == 1 {
                    out.push(line.to_string());
                    seen = 2;
                }
            }
            TableLine::Row(cells) => {
                match seen {
                    0 => header_cells = cells,
                    1 => {
                        out.push(format!("|{}", " --- |".repeat(header_cells)));
                        seen = 2;
                    }
                    _ => {}
                }
                out.push(line.to_string());
                seen += 1;
            }
        }
    }

    out.join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_any_language() {
        assert_eq!(strip_code_fences("```yaml\na: 1\nb: 2\n```"), "a: 1\nb: 2");
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_code_fences("```c++\nint x;\n```"), "int x;");
    }

    #[test]
    fn test_unfenced_answer_untouched() {
        let input = "{\"a\": 1}";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_inner_fences_are_content() {
        let input = "```markdown\nText\n```rust\nfn main() {}\n```\n```";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_normalise_lines() {
        assert_eq!(
            normalise_lines("a \r\nb\u{200B}c\rd\u{FEFF}\t"),
            "a\nbc\nd"
        );
    }

    #[test]
    fn test_blank_runs_capped() {
        assert_eq!(limit_blank_runs("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(limit_blank_runs("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("| a | b | c |"), TableLine::Row(3));
        assert_eq!(classify(" |:---|--:| "), TableLine::Delimiter);
        assert_eq!(classify("a | b"), TableLine::Text);
        assert_eq!(classify("||"), TableLine::Text);
    }

    #[test]
    fn test_missing_delimiter_inserted() {
        let out = repair_tables("intro\n| A | B |\n| 1 | 2 |\n| 3 | 4 |");
        assert_eq!(out, "intro\n| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn test_valid_table_unchanged() {
        let input = "| A | B |\n|:--|--:|\n| 1 | 2 |";
        assert_eq!(repair_tables(input), input);
    }

    #[test]
    fn test_stray_delimiters_dropped() {
        let input = "| A |\n| --- |\n| 1 |\n| --- |\n| 2 |\n\n| --- |\ntext";
        assert_eq!(repair_tables(input), "| A |\n| --- |\n| 1 |\n| 2 |\n\ntext");
    }

    #[test]
    fn test_two_tables_repaired_independently() {
        let out = repair_tables("| A |\n| 1 |\n\n| B | C |\n| 2 | 3 |");
        assert_eq!(out, "| A |\n| --- |\n| 1 |\n\n| B | C |\n| --- | --- |\n| 2 | 3 |");
    }

    #[test]
    fn test_clean_output_yaml() {
        let out = clean_output("```yaml\r\na: 1   \r\nb: 2\r\n```\n", Format::Yaml);
        assert_eq!(out, "a: 1\nb: 2\n");
    }

    #[test]
    fn test_markdown_rules_only_for_markdown() {
        let input = "| A | B |\n| 1 | 2 |";
        assert_eq!(clean_output(input, Format::Txt), "| A | B |\n| 1 | 2 |\n");
        assert_eq!(clean_output(input, Format::Markdown).lines().count(), 3);
    }

    #[test]
    fn test_clean_output_empty_stays_empty() {
        assert_eq!(clean_output("```\n\n```", Format::Json), "");
        assert_eq!(clean_output("   \n", Format::Json), "");
    }

    #[test]
    fn test_parse_detected_format() {
        assert_eq!(parse_detected_format("json"), Some(Format::Json));
        assert_eq!(parse_detected_format("`YAML`\n"), Some(Format::Yaml));
        assert_eq!(parse_detected_format("The format is: python."), Some(Format::Python));
        assert_eq!(parse_detected_format("md"), Some(Format::Markdown));
        assert_eq!(parse_detected_format("JSON format"), Some(Format::Json));
        assert_eq!(parse_detected_format("python code"), Some(Format::Python));
        assert_eq!(parse_detected_format("Looks like a CSV file."), Some(Format::Csv));
        assert_eq!(parse_detected_format("c++"), None);
        assert_eq!(parse_detected_format("no idea"), None);
        assert_eq!(parse_detected_format(""), None);
    }
}
