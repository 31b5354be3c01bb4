//! The media engine boundary.
//!
//! Decoding, encoding, and container serialization happen behind these
//! traits. The composition engine only opens inputs, pulls samples, and
//! appends them to outputs.

use serde::{Deserialize, Serialize};
use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::dimension::FrameSize;

use crate::codec::{AudioCodec, ContainerKind, VideoCodec};
use crate::sample::{Sample, SampleStream};

/// Identifier of a track within one source or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u32);

/// Read-only descriptor of a video track in a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrackRef {
    pub id: TrackId,
    pub codec: VideoCodec,
    /// Nominal frame rate, when the container declares one.
    pub frame_rate: Option<f64>,
    /// Track duration, when the container declares one.
    pub duration_secs: Option<f64>,
}

/// Read-only descriptor of an audio track in a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackRef {
    pub id: TrackId,
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: Option<f64>,
}

/// How samples should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Decoded frames / PCM.
    Decoded,
    /// Encoded packets, forwarded without decoding.
    Encoded,
}

/// Parameters probed before committing to a video encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoEncodeParams {
    pub size: FrameSize,
    pub frame_rate: f64,
    pub bitrate: u32,
}

/// Parameters probed before committing to an audio encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioEncodeParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

/// Video track to add to an output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTrackConfig {
    pub codec: VideoCodec,
    pub params: VideoEncodeParams,
}

/// Audio track to add to an output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioTrackConfig {
    pub codec: AudioCodec,
    pub params: AudioEncodeParams,
}

/// Entry point into the engine.
#[async_trait::async_trait]
pub trait MediaEngine: Send + Sync {
    /// Open a container from bytes. Fails with `UnsupportedInput`.
    async fn open_input(&self, bytes: Vec<u8>) -> SpliceResult<Box<dyn MediaSource>>;

    /// Create an empty output of the given container kind.
    async fn create_output(&self, container: ContainerKind) -> SpliceResult<Box<dyn OutputTarget>>;

    /// Whether this environment can encode `codec` with `params`.
    async fn can_encode_video(&self, codec: VideoCodec, params: &VideoEncodeParams) -> bool;

    /// Whether this environment can encode `codec` with `params`.
    async fn can_encode_audio(&self, codec: AudioCodec, params: &AudioEncodeParams) -> bool;

    /// Drop a container this engine produced and nobody will reopen.
    /// Unknown bytes are ignored.
    fn discard(&self, _bytes: &[u8]) {}

    /// Engine name for logging.
    fn name(&self) -> &str;
}

/// An opened input container.
#[async_trait::async_trait]
pub trait MediaSource: Send {
    fn video_tracks(&self) -> Vec<VideoTrackRef>;

    fn audio_tracks(&self) -> Vec<AudioTrackRef>;

    /// Start a new forward-only stream over one track.
    async fn samples(&mut self, track: TrackId, mode: SampleMode) -> SpliceResult<Box<dyn SampleStream>>;

    /// Release engine resources. Called exactly once.
    fn dispose(self: Box<Self>);
}

/// A destination container being written.
///
/// Tracks are added before [`OutputTarget::start`]; afterwards only
/// samples are appended. Consuming `finalize`/`cancel` makes a second
/// finalize impossible.
#[async_trait::async_trait]
pub trait OutputTarget: Send {
    fn add_video_track(&mut self, config: VideoTrackConfig) -> SpliceResult<TrackId>;

    fn add_audio_track(&mut self, config: AudioTrackConfig) -> SpliceResult<TrackId>;

    async fn start(&mut self) -> SpliceResult<()>;

    /// Append one sample. Packets are muxed as-is; decoded payloads are encoded.
    async fn append(&mut self, track: TrackId, sample: Sample) -> SpliceResult<()>;

    /// Finish the container and hand back its bytes. Fails with `NoDataProduced`.
    async fn finalize(self: Box<Self>) -> SpliceResult<Vec<u8>>;

    /// Abandon the output without producing bytes.
    fn cancel(self: Box<Self>);
}

/// Pick the first video codec that fits `container` and is encodable.
pub async fn select_video_codec(
    engine: &dyn MediaEngine,
    container: ContainerKind,
    candidates: &[VideoCodec],
    params: &VideoEncodeParams,
) -> SpliceResult<VideoCodec> {
    for codec in candidates {
        if !container.supports_video(*codec) {
            tracing::debug!(%codec, %container, "Container cannot carry video codec");
            continue;
        }
        if engine.can_encode_video(*codec, params).await {
            return Ok(*codec);
        }
        tracing::debug!(%codec, size = %params.size, "Video codec not encodable, trying next");
    }
    Err(SpliceError::encode_capability(format!(
        "none of [{}] can be encoded into {container} at {}",
        join(candidates),
        params.size
    )))
}

/// Pick the first audio codec that fits `container` and is encodable.
pub async fn select_audio_codec(
    engine: &dyn MediaEngine,
    container: ContainerKind,
    candidates: &[AudioCodec],
    params: &AudioEncodeParams,
) -> SpliceResult<AudioCodec> {
    for codec in candidates {
        if !container.supports_audio(*codec) {
            tracing::debug!(%codec, %container, "Container cannot carry audio codec");
            continue;
        }
        if engine.can_encode_audio(*codec, params).await {
            return Ok(*codec);
        }
        tracing::debug!(%codec, "Audio codec not encodable, trying next");
    }
    Err(SpliceError::encode_capability(format!(
        "none of [{}] can be encoded into {container}",
        join(candidates)
    )))
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
