//! Prompts for LLM-based text conversion and format detection.
//!
//! Every prompt lives here so the service adapter in
//! [`crate::pipeline::llm`] only deals with retries and errors, and so tests
//! can inspect prompt text without a live model.
//!
//! Callers can override the conversion prompt via
//! [`crate::config::ConverterConfig::system_prompt`]; the detection prompt is
//! fixed because its answer is parsed.

/// Default system prompt for converting content between formats.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert file-format converter. You receive a document in a source format and rewrite it in a target format.

Follow these rules precisely:

1. FIDELITY
   - Preserve ALL data, structure and logic of the input
   - Never invent values, keys, rows or statements that are not in the input
   - Keep the original ordering of records, keys and sections

2. SYNTAX
   - The output must be syntactically valid in the target format
   - For code targets, produce idiomatic code with equivalent behaviour
   - For data targets, map nested structures faithfully (objects, arrays, rows)

3. MARKDOWN TARGETS
   - Use GFM pipe tables for tabular data
   - Use headings and lists to mirror the input structure

4. OUTPUT FORMAT
   - Output ONLY the converted content
   - Do NOT wrap the output in ``` fences
   - Do NOT add commentary, explanations or notes"#;

/// System prompt for identifying the format of a snippet.
pub const DETECTION_SYSTEM_PROMPT: &str = r#"You identify the format of code and text snippets.
Answer with the format name only, in lowercase, for example: json, yaml, xml, csv, markdown, html, python, javascript, typescript, rust.
If you cannot tell, answer: txt"#;

/// User message carrying the content to convert.
pub fn conversion_request(source: &str, target: &str, content: &str) -> String {
    format!(
        "Convert the following content from {source} to {target}.\n\nContent:\n{content}"
    )
}

/// User message carrying the sample to identify.
pub fn detection_request(sample: &str) -> String {
    format!("Identify the format of this snippet:\n\n{sample}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_request_names_both_formats() {
        let msg = conversion_request("csv", "markdown", "a,b\n1,2");
        assert!(msg.contains("from csv to markdown"));
        assert!(msg.ends_with("a,b\n1,2"));
    }

    #[test]
    fn detection_prompt_names_fallback() {
        assert!(DETECTION_SYSTEM_PROMPT.contains("txt"));
    }
}
