//! Pipeline stages for a single conversion attempt.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own. The router ([`crate::router`]) strings them together.
//!
//! ## Data Flow
//!
//! ```text
//!             ┌──▶ raster ───────────────────────────────┐  (image payloads)
//! input ──────┤                                           ├──▶ outcome
//! (path/URL)  └──▶ llm ──▶ postprocess ──▶ [encode] ──────┘  (text payloads)
//!                 (service)  (cleanup)   (pdf/docx/xlsx)
//! ```
//!
//! 1. [`input`]  — load a path or URL and sniff what kind of content it is
//! 2. [`raster`] — decode and re-encode images; runs in `spawn_blocking`
//! 3. [`llm`]    — the text service seam with retry/backoff; the only stage
//!    with network I/O besides URL intake
//! 4. [`postprocess`] — deterministic cleanup of model answers
//! 5. [`encode`] — lay markdown out as PDF, DOCX or XLSX bytes

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod raster;
