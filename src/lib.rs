//! # edgequake-convert
//!
//! Convert files between text, data, code, document and image formats, with
//! an auditable history of every attempt.
//!
//! ## Why this crate?
//!
//! Rewriting JSON as YAML, a CSV as a Markdown table or a Python script as
//! TypeScript is tedious to do with one hand-written converter per pair.
//! Instead this crate hands text-to-text rewriting to an LLM and keeps
//! everything an LLM cannot produce local: PDF, DOCX and XLSX files are laid
//! out from a markdown intermediate, and images are decoded and re-encoded
//! without any model at all.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (path / URL)
//!  │
//!  ├─ 1. Intake     read or download, sniff image / PDF / text
//!  ├─ 2. Ledger     append a `pending` history entry
//!  ├─ 3. Detect     ask the model for the source format (`auto` text only)
//!  ├─ 4. Route      image re-encode │ direct LLM call │ LLM → markdown → encoder
//!  ├─ 5. Normalize  text or `data:` URI + suggested file name
//!  └─ 6. Ledger     mark the entry `completed` or `failed`
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_convert::{
//!     ConversionRequest, Converter, ConverterConfig, FileStore, Format, HistoryLedger,
//!     SourceFormat,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileStore::open(edgequake_convert::default_state_dir())?);
//!     let ledger = Arc::new(HistoryLedger::load(store)?);
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let converter = Converter::from_config(ConverterConfig::default(), ledger)?;
//!
//!     let request = ConversionRequest::text(
//!         SourceFormat::Known(Format::Csv),
//!         Format::Pdf,
//!         "name,age\nada,36\n",
//!     );
//!     let output = converter.run_conversion(request).await?;
//!     println!("{} ({} bytes)", output.result.suggested_file_name, output.result.content.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `eqconvert` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-convert = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod preferences;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod router;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{default_state_dir, ConverterConfig, ConverterConfigBuilder};
pub use convert::{
    export_history_to_file, save_history_result, write_result, ConversionOutput, Converter,
    DEFAULT_ARCHIVE_FILE_NAME,
};
pub use error::{ConvertError, LedgerError, StoreError, ANOMALY_MESSAGE};
pub use formats::{Format, FormatDescriptor, FormatKind, SourceFormat};
pub use history::{EntryStatus, HistoryEntry, HistoryLedger, Transition};
pub use output::{normalize, ConversionOutcome, DataUri, NormalizedResult};
pub use pipeline::llm::{ConversionService, LlmConversionService};
pub use preferences::{Preferences, Theme};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use request::{ContentKind, ConversionRequest, Payload};
pub use router::{ConversionRouter, Route};
pub use store::{FileStore, KvStore, MemoryStore};
pub use stream::{convert_inputs_stream, convert_stream, BatchItem, ConversionStream};
