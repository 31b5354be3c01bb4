//! Splice Edit Model
//!
//! Defines the data contracts shared by the editing tools:
//! - **Regions:** Normalized rectangles for crop and watermark placement
//! - **Interaction:** The pointer state machine that creates, moves, and resizes a region
//! - **Dimensions:** The even-pixel policy every encoder target goes through
//! - **Quality:** Closed quality presets resolved to a bitrate once per job
//! - **Time ranges:** Trim windows for the cut tool
//!
//! All region coordinates are normalized to `[0.0, 1.0]` relative to a
//! reference frame so they survive a change of preview size.

pub mod dimension;
pub mod interaction;
pub mod quality;
pub mod rect;
pub mod time_range;

pub use dimension::*;
pub use interaction::*;
pub use quality::*;
pub use rect::*;
pub use time_range::*;
