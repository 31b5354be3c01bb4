//! Splice Audio
//!
//! Whole-track PCM utilities used by the audio replace, extract, and blend
//! tools, and by the assembler when it fills gaps with silence.
//!
//! Buffers are planar `f32`. Nothing here resamples: sample rates are
//! carried through, and operations that would need a conversion fail.

pub mod buffer;
pub mod decode;
pub mod extract;
pub mod ops;

pub use buffer::PcmBuffer;
pub use decode::{decode, decode_track};
pub use extract::extract_audio;
pub use ops::{conform_chunk, match_duration, mix};
