//! The history ledger: an auditable, persisted log of conversion attempts.
//!
//! ## State machine
//!
//! ```text
//!            ┌──(success)──▶ completed
//! pending ───┤
//!            └──(failure)──▶ failed
//! ```
//!
//! Both terminal states are final. A retry is a new attempt with a new entry;
//! entries are never re-opened and never deleted individually, only cleared in
//! bulk.
//!
//! ## Persistence
//!
//! The whole ordered sequence is the unit of persistence. Every successful
//! mutation rewrites it through the [`KvStore`] before returning, while still
//! holding the ledger lock, so concurrent attempts can never interleave a
//! read-modify-write and the stored copy is at most one operation behind.

use crate::error::LedgerError;
use crate::store::{KvStore, HISTORY_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// File name used when no source name is known.
pub const UNKNOWN_FILE_NAME: &str = "Unknown";

/// Lifecycle status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EntryStatus::Pending)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        })
    }
}

/// One persisted record of a single conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub file_name: String,
    pub source_format: String,
    pub target_format: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_binary: Option<bool>,
}

impl HistoryEntry {
    /// A fresh `pending` entry.
    pub fn pending(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        file_name: Option<&str>,
        source_format: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            file_name: file_name
                .filter(|n| !n.is_empty())
                .unwrap_or(UNKNOWN_FILE_NAME)
                .to_string(),
            source_format: source_format.into(),
            target_format: target_format.into(),
            status: EntryStatus::Pending,
            result: None,
            is_binary: None,
        }
    }
}

/// The only two ways a pending entry can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Completed { result: String, is_binary: bool },
    Failed,
}

impl Transition {
    pub fn status(&self) -> EntryStatus {
        match self {
            Transition::Completed { .. } => EntryStatus::Completed,
            Transition::Failed => EntryStatus::Failed,
        }
    }
}

/// Most-recent-first log of attempts, written through to a [`KvStore`].
pub struct HistoryLedger {
    store: Arc<dyn KvStore>,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryLedger")
            .field("store", &"<dyn KvStore>")
            .field("entries", &self.lock().len())
            .finish()
    }
}

impl HistoryLedger {
    /// Read the persisted sequence once at startup.
    ///
    /// A missing key yields an empty ledger; unparseable data is an error
    /// rather than a silent reset, so history is never discarded implicitly.
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self, LedgerError> {
        let entries = match store.get(HISTORY_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };
        debug!("Loaded {} history entries", entries.len());
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    /// Insert a `pending` entry at the head of the sequence.
    pub fn append(&self, entry: HistoryEntry) -> Result<(), LedgerError> {
        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                id: entry.id,
                from: entry.status,
            });
        }

        let mut entries = self.lock();
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(LedgerError::DuplicateEntry { id: entry.id });
        }

        let id = entry.id.clone();
        entries.insert(0, entry);
        if let Err(e) = self.flush(&entries) {
            entries.remove(0);
            return Err(e);
        }
        debug!("History entry {} appended (pending)", id);
        Ok(())
    }

    /// Move a `pending` entry to its terminal status.
    ///
    /// The in-memory transition stands even if the write fails (the error is
    /// still returned); the next successful flush carries it to the store.
    pub fn update(&self, id: &str, transition: Transition) -> Result<(), LedgerError> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| LedgerError::EntryNotFound { id: id.to_string() })?;

        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                id: id.to_string(),
                from: entry.status,
            });
        }

        entry.status = transition.status();
        if let Transition::Completed { result, is_binary } = transition {
            entry.result = Some(result);
            entry.is_binary = Some(is_binary);
        }
        debug!("History entry {} → {}", id, entry.status);

        self.flush(&entries)
    }

    /// Remove every entry. Irreversible.
    ///
    /// The persisted key is removed rather than overwritten with an empty
    /// list; a later `load` treats the missing key as an empty ledger.
    pub fn clear(&self) -> Result<(), LedgerError> {
        let mut entries = self.lock();
        self.store.remove(HISTORY_KEY)?;
        let previous = std::mem::take(&mut *entries);
        info!("History cleared ({} entries removed)", previous.len());
        Ok(())
    }

    /// Complete serialized snapshot of the ordered sequence.
    ///
    /// Same JSON layout as the persisted copy, so an export can be dropped
    /// into a store and loaded back verbatim.
    pub fn export(&self) -> Result<String, LedgerError> {
        let entries = self.lock();
        serde_json::to_string_pretty(&*entries).map_err(|e| LedgerError::Corrupt {
            detail: e.to_string(),
        })
    }

    /// Snapshot of all entries, most recent first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, entries: &[HistoryEntry]) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec(entries).map_err(|e| LedgerError::Corrupt {
            detail: e.to_string(),
        })?;
        self.store.put(HISTORY_KEY, &bytes)?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<HistoryEntry>, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Corrupt {
        detail: e.to_string(),
    })
}
