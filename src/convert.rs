//! The orchestrator: one call, one history entry, one result.
//!
//! [`Converter::run_conversion`] owns an attempt end to end:
//!
//! ```text
//! append pending ──▶ detect (auto text only) ──▶ router ──▶ normalize ──▶ update
//!                                                   │
//!                                                   └── error ──▶ update(failed) ──▶ Anomaly
//! ```
//!
//! Every call that gets past `append` leaves exactly one terminal entry in
//! the ledger before it returns. Router errors never escape raw: they are
//! wrapped in [`ConvertError::Anomaly`], whose message is fixed and whose
//! `source()` is the real cause.
//!
//! The file helpers at the bottom write results and history archives to disk
//! atomically (temp file + rename).

use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::formats::{Format, SourceFormat};
use crate::history::{HistoryEntry, HistoryLedger, Transition};
use crate::output::{normalize, suggested_file_name, ConversionOutcome, NormalizedResult};
use crate::pipeline::input;
use crate::pipeline::llm::{ConversionService, LlmConversionService};
use crate::pipeline::postprocess::parse_detected_format;
use crate::progress::Stage;
use crate::request::{ContentKind, ConversionRequest};
use crate::router::ConversionRouter;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default file name for a history archive export.
pub const DEFAULT_ARCHIVE_FILE_NAME: &str = "conversion_history_archive.json";

/// A successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    /// Id of the (now completed) history entry.
    pub entry_id: String,
    /// Source format after detection. Stays `Auto` only for images of a
    /// format outside the catalog (GIF, BMP).
    pub source: SourceFormat,
    pub target: Format,
    pub result: NormalizedResult,
}

/// Runs conversion attempts and records them in a [`HistoryLedger`].
pub struct Converter {
    router: ConversionRouter,
    service: Arc<dyn ConversionService>,
    ledger: Arc<HistoryLedger>,
    config: ConverterConfig,
}

impl Converter {
    pub fn new(
        service: Arc<dyn ConversionService>,
        ledger: Arc<HistoryLedger>,
        config: ConverterConfig,
    ) -> Self {
        Self {
            router: ConversionRouter::new(Arc::clone(&service)),
            service,
            ledger,
            config,
        }
    }

    /// Build a converter backed by the LLM provider `config` resolves to.
    pub fn from_config(
        config: ConverterConfig,
        ledger: Arc<HistoryLedger>,
    ) -> Result<Self, ConvertError> {
        let service = LlmConversionService::from_config(&config)?;
        Ok(Self::new(Arc::new(service), ledger, config))
    }

    pub fn ledger(&self) -> &Arc<HistoryLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Load `input` (path or URL) and convert it.
    ///
    /// `source` overrides the format sniffed from the content. Intake
    /// failures are returned as-is and leave no history entry.
    pub async fn convert_input(
        &self,
        input: &str,
        target: Format,
        source: Option<SourceFormat>,
    ) -> Result<ConversionOutput, ConvertError> {
        let upload = input::load_upload(input, self.config.download_timeout_secs).await?;
        self.run_conversion(upload.into_request(target, source)).await
    }

    /// Run one conversion attempt.
    ///
    /// # Errors
    /// - [`ConvertError::Anomaly`] when the router failed; the entry is
    ///   marked `failed`.
    /// - [`ConvertError::Ledger`] when the pending entry could not be
    ///   recorded, or the completed status could not be persisted.
    pub async fn run_conversion(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutput, ConvertError> {
        let start = Instant::now();
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let target = request.target;

        let entry = HistoryEntry::pending(
            id.as_str(),
            created_at,
            request.file_name.as_deref(),
            request.source.history_label(),
            target.id(),
        );
        let file_name = entry.file_name.clone();
        self.ledger.append(entry)?;
        info!(
            "Attempt {}: {} ({} → {}, {} bytes)",
            id,
            file_name,
            request.source,
            target,
            request.payload.len()
        );

        let cb = self.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_attempt_start(&id, &file_name);
        }
        let on_stage = |stage: Stage| {
            debug!("Attempt {}: {}", id, stage);
            if let Some(ref cb) = cb {
                cb.on_stage(&id, stage);
            }
        };

        let request = self.resolve_source(&id, request, &on_stage).await;
        let source = request.source;

        let routed = self.router.convert_with_stages(request, &on_stage).await;
        match routed {
            Ok(outcome) => self.complete(id, source, target, created_at, outcome, start),
            Err(cause) => {
                warn!("Attempt {} failed after {:?}: {}", id, start.elapsed(), cause);
                if let Err(e) = self.ledger.update(&id, Transition::Failed) {
                    error!("Attempt {}: could not record failure: {}", id, e);
                }
                if let Some(ref cb) = cb {
                    cb.on_attempt_error(&id, &cause.to_string());
                }
                Err(ConvertError::Anomaly {
                    entry_id: id,
                    source: Box::new(cause),
                })
            }
        }
    }

    fn complete(
        &self,
        id: String,
        source: SourceFormat,
        target: Format,
        created_at: chrono::DateTime<Utc>,
        outcome: ConversionOutcome,
        start: Instant,
    ) -> Result<ConversionOutput, ConvertError> {
        let result = normalize(&outcome, target, created_at);
        self.ledger.update(
            &id,
            Transition::Completed {
                result: result.content.clone(),
                is_binary: result.is_binary,
            },
        )?;
        info!(
            "Attempt {} completed in {:?}: {} ({} bytes)",
            id,
            start.elapsed(),
            result.suggested_file_name,
            result.content.len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_attempt_complete(&id, result.is_binary);
        }
        Ok(ConversionOutput {
            entry_id: id,
            source,
            target,
            result,
        })
    }

    /// Replace an `auto` source on a text payload with the detected format.
    ///
    /// Detection never fails the attempt: errors and unrecognised answers
    /// fall back to plain text.
    async fn resolve_source(
        &self,
        id: &str,
        mut request: ConversionRequest,
        on_stage: &(dyn Fn(Stage) + Send + Sync),
    ) -> ConversionRequest {
        if request.source != SourceFormat::Auto || request.content_kind() == ContentKind::Image {
            return request;
        }

        on_stage(Stage::Detecting);
        let detected = {
            let text = request.payload.as_text();
            let sample = sample_prefix(&text, self.config.detection_sample_chars);
            match self.service.detect(sample).await {
                Ok(answer) => parse_detected_format(&answer).unwrap_or_else(|| {
                    warn!(
                        "Attempt {}: unrecognised detection answer {:?}; assuming txt",
                        id,
                        answer.trim()
                    );
                    Format::Txt
                }),
                Err(e) => {
                    warn!("Attempt {}: detection failed ({}); assuming txt", id, e);
                    Format::Txt
                }
            }
        };
        info!("Attempt {}: detected source format {}", id, detected);
        request.source = SourceFormat::Known(detected);
        request
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
fn sample_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ── Writing results to disk ──────────────────────────────────────────────

/// Write a normalized result to `path`; binary results are decoded from
/// their data URI first.
pub async fn write_result(result: &NormalizedResult, path: &Path) -> Result<(), ConvertError> {
    let bytes = result.to_bytes()?;
    write_atomic(path, &bytes).await
}

/// Write the stored result of history entry `id`.
///
/// With `path = None` the file is named the way the original attempt would
/// have suggested and placed in `out_dir`. Returns the path written.
pub async fn save_history_result(
    ledger: &HistoryLedger,
    id: &str,
    path: Option<&Path>,
    out_dir: &Path,
) -> Result<PathBuf, ConvertError> {
    let entry = ledger
        .get(id)
        .ok_or_else(|| crate::error::LedgerError::EntryNotFound { id: id.to_string() })?;
    let (content, is_binary) = match (&entry.result, entry.is_binary) {
        (Some(content), Some(is_binary)) => (content.as_str(), is_binary),
        _ => {
            return Err(ConvertError::NoResult {
                id: id.to_string(),
                status: entry.status,
            })
        }
    };

    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let name = match entry.target_format.parse::<Format>() {
                Ok(target) => suggested_file_name(target, entry.timestamp),
                Err(_) => format!(
                    "{}-{}",
                    crate::output::FILE_NAME_PREFIX,
                    entry.timestamp.timestamp_millis()
                ),
            };
            out_dir.join(name)
        }
    };

    let bytes = match ConversionOutcome::from_stored(content, is_binary)? {
        ConversionOutcome::Text(t) => t.into_bytes(),
        ConversionOutcome::Binary(uri) => uri.into_bytes(),
    };
    write_atomic(&path, &bytes).await?;
    info!("Saved result of {} to {}", id, path.display());
    Ok(path)
}

/// Export the whole ledger as pretty JSON to `path`.
pub async fn export_history_to_file(
    ledger: &HistoryLedger,
    path: &Path,
) -> Result<usize, ConvertError> {
    let json = ledger.export()?;
    write_atomic(path, json.as_bytes()).await?;
    info!("Exported {} history entries to {}", ledger.len(), path.display());
    Ok(ledger.len())
}

/// Atomic write: write to a sibling temp file, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let write_err = |e: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
