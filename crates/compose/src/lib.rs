//! Splice Compose
//!
//! Turns an ordered list of clips into one output container.
//!
//! # Pipeline
//!
//! ```text
//! ClipInput ──▶ open ──▶ TrackNormalizer ──┬── Direct ─────────────┐
//!                          │               └── Re-encode ──▶ temp ─┤
//!                          │                    (transform,        │
//!                          │                     speed, trim)      ▼
//!                          └──────────── Assembler: rebase by cursor,
//!                                         best-effort audio, silence
//!                                                      │
//!                                                      ▼
//!                                                 OutputTarget
//! ```

pub mod assembler;
pub mod clip;
pub mod job;
pub mod normalizer;
pub mod progress;
pub mod transform;

pub use assembler::*;
pub use clip::*;
pub use job::*;
pub use normalizer::{NormalizePath, ReencodeReason, TrackNormalizer};
pub use progress::*;
pub use transform::*;
