//! Splice Media Engine
//!
//! The boundary between composition and the codec/container machinery.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  open_input   ┌─────────────┐  samples   ┌──────────────┐
//! │  MediaEngine  │──────────────▶│ MediaSource │───────────▶│ SampleStream │
//! │               │               └─────────────┘            └──────┬───────┘
//! │               │  create_output ┌──────────────┐   append         │
//! │               │───────────────▶│ OutputTarget │◀─────────────────┘
//! └───────────────┘                └──────────────┘
//! ```
//!
//! [`memory::MemoryEngine`] implements the contract in-process and keeps a
//! ledger of every resource it hands out.

pub mod codec;
pub mod engine;
pub mod guard;
pub mod memory;
pub mod sample;

pub use codec::*;
pub use engine::*;
pub use guard::{OutputHandle, SourceHandle};
pub use memory::{
    LedgerSnapshot, MemoryContainer, MemoryEngine, MemoryTrack, StoredContent, StoredSample, TrackFormat,
};
pub use sample::*;
