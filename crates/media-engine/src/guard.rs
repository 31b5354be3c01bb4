//! Scoped ownership of engine resources.
//!
//! [`SourceHandle`] disposes its source exactly once, either explicitly or
//! when dropped on an early return. [`OutputHandle`] cancels its output
//! when dropped without being finalized.

use splice_common::error::{SpliceError, SpliceResult};

use crate::codec::ContainerKind;
use crate::engine::{
    AudioTrackConfig, AudioTrackRef, MediaEngine, MediaSource, OutputTarget, SampleMode, TrackId,
    VideoTrackConfig, VideoTrackRef,
};
use crate::sample::{Sample, SampleStream};

/// An opened source, disposed exactly once.
pub struct SourceHandle {
    label: String,
    source: Option<Box<dyn MediaSource>>,
}

impl SourceHandle {
    pub fn new(label: impl Into<String>, source: Box<dyn MediaSource>) -> Self {
        Self {
            label: label.into(),
            source: Some(source),
        }
    }

    /// Open `bytes` and wrap the resulting source.
    pub async fn open(
        engine: &dyn MediaEngine,
        label: impl Into<String>,
        bytes: Vec<u8>,
    ) -> SpliceResult<Self> {
        let source = engine.open_input(bytes).await?;
        Ok(Self::new(label, source))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// First video track, if any.
    pub fn video_track(&self) -> Option<VideoTrackRef> {
        self.source
            .as_ref()
            .and_then(|s| s.video_tracks().into_iter().next())
    }

    /// First audio track, if any.
    pub fn audio_track(&self) -> Option<AudioTrackRef> {
        self.source
            .as_ref()
            .and_then(|s| s.audio_tracks().into_iter().next())
    }

    pub async fn samples(
        &mut self,
        track: TrackId,
        mode: SampleMode,
    ) -> SpliceResult<Box<dyn SampleStream>> {
        match self.source.as_mut() {
            Some(source) => source.samples(track, mode).await,
            None => Err(SpliceError::engine(format!(
                "Source '{}' was already disposed",
                self.label
            ))),
        }
    }

    /// Dispose now.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::trace!(source = %self.label, "Disposing source");
            source.dispose();
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// An output under construction. Dropping it unfinalized cancels it.
pub struct OutputHandle {
    container: ContainerKind,
    output: Option<Box<dyn OutputTarget>>,
}

impl OutputHandle {
    pub async fn create(engine: &dyn MediaEngine, container: ContainerKind) -> SpliceResult<Self> {
        let output = engine.create_output(container).await?;
        Ok(Self {
            container,
            output: Some(output),
        })
    }

    pub fn container(&self) -> ContainerKind {
        self.container
    }

    fn target(&mut self) -> SpliceResult<&mut Box<dyn OutputTarget>> {
        self.output
            .as_mut()
            .ok_or_else(|| SpliceError::engine("Output is no longer open"))
    }

    pub fn add_video_track(&mut self, config: VideoTrackConfig) -> SpliceResult<TrackId> {
        self.target()?.add_video_track(config)
    }

    pub fn add_audio_track(&mut self, config: AudioTrackConfig) -> SpliceResult<TrackId> {
        self.target()?.add_audio_track(config)
    }

    pub async fn start(&mut self) -> SpliceResult<()> {
        self.target()?.start().await
    }

    pub async fn append(&mut self, track: TrackId, sample: Sample) -> SpliceResult<()> {
        self.target()?.append(track, sample).await
    }

    /// Finish the container. Consumes the handle.
    pub async fn finalize(mut self) -> SpliceResult<Vec<u8>> {
        match self.output.take() {
            Some(output) => output.finalize().await,
            None => Err(SpliceError::engine("Output is no longer open")),
        }
    }

    /// Abandon the output.
    pub fn cancel(mut self) {
        self.abandon();
    }

    fn abandon(&mut self) {
        if let Some(output) = self.output.take() {
            tracing::debug!(container = %self.container, "Cancelling output");
            output.cancel();
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        self.abandon();
    }
}
