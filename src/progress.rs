//! Progress-callback trait for per-attempt conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConverterConfigBuilder::progress_callback`] to receive
//! events as each attempt moves through detection, the text service and
//! local encoding.
//!
//! The trait is `Send + Sync` because batch conversion runs attempts
//! concurrently; every method has a no-op default.
//!
//! # Example
//!
//! ```rust
//! use edgequake_convert::{ConversionProgressCallback, ConverterConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_attempt_complete(&self, entry_id: &str, is_binary: bool) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{entry_id} done (binary: {is_binary}), {done} so far");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConverterConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Step of an attempt currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Asking the text service which format an `auto` source is.
    Detecting,
    /// Waiting on the remote text service.
    Converting,
    /// Building a PDF/DOCX/XLSX document locally.
    EncodingDocument,
    /// Decoding and re-encoding a raster image locally.
    EncodingImage,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Detecting => "detecting format",
            Stage::Converting => "converting",
            Stage::EncodingDocument => "building document",
            Stage::EncodingImage => "re-encoding image",
        })
    }
}

/// Called by the orchestrator and router as an attempt progresses.
///
/// When attempts run concurrently the methods may be called from several
/// tasks at once; guard shared state accordingly.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, right after the pending history entry is written.
    fn on_attempt_start(&self, entry_id: &str, file_name: &str) {
        let _ = (entry_id, file_name);
    }

    /// Called when the attempt enters a new stage.
    fn on_stage(&self, entry_id: &str, stage: Stage) {
        let _ = (entry_id, stage);
    }

    /// Called after the entry is marked `completed`.
    fn on_attempt_complete(&self, entry_id: &str, is_binary: bool) {
        let _ = (entry_id, is_binary);
    }

    /// Called after the entry is marked `failed`.
    ///
    /// `error` is the underlying cause, not the user-facing message.
    fn on_attempt_error(&self, entry_id: &str, error: &str) {
        let _ = (entry_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConverterConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for RecordingCallback {
        fn on_attempt_start(&self, entry_id: &str, _file_name: &str) {
            self.events.lock().unwrap().push(format!("start {entry_id}"));
        }

        fn on_stage(&self, _entry_id: &str, stage: Stage) {
            self.events.lock().unwrap().push(stage.to_string());
        }

        fn on_attempt_error(&self, _entry_id: &str, error: &str) {
            self.events.lock().unwrap().push(format!("error {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_attempt_start("a", "f.csv");
        cb.on_stage("a", Stage::Converting);
        cb.on_attempt_complete("a", true);
        cb.on_attempt_error("a", "boom");
    }

    #[test]
    fn recording_callback_sees_events_in_order() {
        let cb = RecordingCallback::default();
        cb.on_attempt_start("a", "f.csv");
        cb.on_stage("a", Stage::Converting);
        cb.on_stage("a", Stage::EncodingDocument);
        cb.on_attempt_error("a", "encoder crashed");
        // Default impl: ignored.
        cb.on_attempt_complete("a", false);

        let events = cb.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["start a", "converting", "building document", "error encoder crashed"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_attempt_start("a", "x");
        cb.on_stage("a", Stage::Detecting);
    }
}
