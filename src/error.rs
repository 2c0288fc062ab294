//! Error types for the edgequake-convert library.
//!
//! Three error types mirror the three layers that can fail:
//!
//! * [`ConvertError`] — anything a single conversion attempt (or the intake
//!   that prepares it) can fail with. Returned from the router, the
//!   orchestrator and the intake helpers.
//!
//! * [`LedgerError`] — misuse of the history ledger (unknown id, illegal
//!   state transition) or a failure to load/flush its persisted copy. These
//!   are internal invariant violations in correct operation.
//!
//! * [`StoreError`] — the key-value byte store underneath the ledger and the
//!   preferences could not be read or written.
//!
//! The orchestrator never lets a router error escape raw: it records the
//! failure in the ledger and wraps the cause in [`ConvertError::Anomaly`],
//! whose `Display` is a fixed user-facing message.

use crate::history::EntryStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Fixed message surfaced to users when a conversion attempt fails.
pub const ANOMALY_MESSAGE: &str =
    "The conversion engine encountered an anomaly during transformation.";

/// All errors a conversion attempt can produce.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Catalog errors ────────────────────────────────────────────────────
    /// Format id is not part of the fixed catalog.
    #[error("Unknown format '{id}'\nRun `eqconvert formats` to list supported formats.")]
    UnknownFormat { id: String },

    /// A text-path request reached the router with an `auto` source format.
    #[error("Source format was not resolved before routing")]
    UnresolvedSource,

    // ── Local encoding errors ─────────────────────────────────────────────
    /// Source bytes could not be decoded as a raster image.
    #[error("Failed to decode source image: {detail}")]
    ImageDecode { detail: String },

    /// Decoded raster could not be written in the target encoding.
    #[error("Failed to encode image as {format}: {detail}")]
    ImageEncode { format: String, detail: String },

    /// PDF/DOCX/XLSX writer failed.
    #[error("Failed to build {format} document: {detail}")]
    DocumentEncode { format: String, detail: String },

    // ── Remote service errors ─────────────────────────────────────────────
    /// The text service was unreachable or returned no usable text.
    #[error("Text conversion service failed: {message}")]
    RemoteConversion { message: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// A stored binary result is not a well-formed base64 data URI.
    #[error("Invalid data URI: {detail}")]
    InvalidDataUri { detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A history entry was asked for its result but never completed.
    #[error("History entry '{id}' has no result (status: {status})")]
    NoResult { id: String, status: EntryStatus },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Ledger ────────────────────────────────────────────────────────────
    /// The history ledger rejected an operation or could not persist it.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // ── Surfaced failure ──────────────────────────────────────────────────
    /// A conversion attempt failed; its ledger entry is marked `failed`.
    ///
    /// Displays [`ANOMALY_MESSAGE`]; the underlying cause is available via
    /// [`std::error::Error::source`].
    #[error("{}", ANOMALY_MESSAGE)]
    Anomaly {
        entry_id: String,
        #[source]
        source: Box<ConvertError>,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// The root cause of an [`ConvertError::Anomaly`], or `self` otherwise.
    pub fn root_cause(&self) -> &ConvertError {
        match self {
            ConvertError::Anomaly { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised by the history ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("History entry '{id}' not found")]
    EntryNotFound { id: String },

    /// Entries only move `pending → completed` or `pending → failed`.
    #[error("History entry '{id}' is {from}; only pending entries can change status")]
    InvalidTransition { id: String, from: EntryStatus },

    #[error("History entry '{id}' already exists")]
    DuplicateEntry { id: String },

    /// Persisted history could not be parsed.
    #[error("Stored history is corrupt: {detail}")]
    Corrupt { detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a [`crate::store::KvStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}
