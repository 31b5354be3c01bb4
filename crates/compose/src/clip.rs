//! Clip descriptions handed to the assembler.

use std::sync::Arc;

use splice_audio::PcmBuffer;
use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::time_range::TimeRange;

use crate::transform::FrameTransform;

/// What happens to a clip's own audio.
#[derive(Debug, Clone, Default)]
pub enum AudioEdit {
    /// Use the clip's audio track; silence if it has none.
    #[default]
    Keep,
    /// Silence for the whole clip.
    Mute,
    /// Replace with this buffer, padded or truncated to the clip span.
    Replace(PcmBuffer),
    /// Mix the clip's audio with `other`.
    Blend {
        other: PcmBuffer,
        gain_clip: f32,
        gain_other: f32,
    },
}

impl AudioEdit {
    /// Buffer brought in from outside the clip, if any.
    pub fn external_buffer(&self) -> Option<&PcmBuffer> {
        match self {
            AudioEdit::Replace(buffer) | AudioEdit::Blend { other: buffer, .. } => Some(buffer),
            AudioEdit::Keep | AudioEdit::Mute => None,
        }
    }
}

/// Edits applied to one clip.
#[derive(Debug, Clone)]
pub struct ClipEdit {
    /// Source window to keep.
    pub trim: TimeRange,
    /// Playback speed factor; `2.0` halves the duration.
    pub speed: f64,
    /// Pixel transform for the re-encode path.
    pub transform: Option<Arc<dyn FrameTransform>>,
    /// Requested output size. Only the first clip's request shapes the output.
    pub resize: Option<(f64, f64)>,
    pub audio: AudioEdit,
}

impl Default for ClipEdit {
    fn default() -> Self {
        Self {
            trim: TimeRange::full(),
            speed: 1.0,
            transform: None,
            resize: None,
            audio: AudioEdit::Keep,
        }
    }
}

impl ClipEdit {
    pub fn with_trim(mut self, trim: TimeRange) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_transform(mut self, transform: impl FrameTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_resize(mut self, width: f64, height: f64) -> Self {
        self.resize = Some((width, height));
        self
    }

    pub fn with_audio(mut self, audio: AudioEdit) -> Self {
        self.audio = audio;
        self
    }

    /// Whether the speed factor changes timing.
    pub fn changes_speed(&self) -> bool {
        (self.speed - 1.0).abs() > 1e-9
    }

    /// Whether timestamps have to be rewritten on the re-encode path.
    pub fn retimes(&self) -> bool {
        self.changes_speed() || self.trim.trims_start()
    }

    pub fn validate(&self) -> SpliceResult<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(SpliceError::config(format!(
                "Speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// One clip of a composition job.
#[derive(Debug, Clone)]
pub struct ClipInput {
    /// Name used in logs and reports.
    pub label: String,
    /// Container bytes, opened through the engine.
    pub bytes: Vec<u8>,
    pub edit: ClipEdit,
}

impl ClipInput {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes,
            edit: ClipEdit::default(),
        }
    }

    pub fn with_edit(mut self, edit: ClipEdit) -> Self {
        self.edit = edit;
        self
    }
}
