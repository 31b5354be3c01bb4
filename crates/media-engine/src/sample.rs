//! Timestamped media samples and the lazy streams that produce them.

use std::fmt;
use std::sync::Arc;

use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::dimension::FrameSize;

use crate::codec::CodecId;

/// A decoded RGBA8 video frame.
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl VideoFrame {
    /// Wrap tightly packed RGBA8 pixels.
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> SpliceResult<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(SpliceError::engine(format!(
                "Frame buffer is {} bytes, expected {expected} for {width}x{height} RGBA",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at `(x, y)`; `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// A chunk of decoded planar f32 PCM.
#[derive(Clone, PartialEq)]
pub struct PcmChunk {
    sample_rate: u32,
    planes: Arc<[Vec<f32>]>,
}

impl PcmChunk {
    /// Build from one plane per channel. All planes must have the same length.
    pub fn new(sample_rate: u32, planes: Vec<Vec<f32>>) -> SpliceResult<Self> {
        if sample_rate == 0 || planes.is_empty() {
            return Err(SpliceError::engine(
                "PCM chunk needs a sample rate and at least one channel",
            ));
        }
        let frames = planes[0].len();
        if planes.iter().any(|p| p.len() != frames) {
            return Err(SpliceError::engine("PCM planes differ in length"));
        }
        Ok(Self {
            sample_rate,
            planes: planes.into(),
        })
    }

    /// Zero-filled chunk.
    pub fn silence(sample_rate: u32, channels: u16, frames: usize) -> Self {
        let planes: Vec<Vec<f32>> = (0..channels.max(1)).map(|_| vec![0.0; frames]).collect();
        Self {
            sample_rate: sample_rate.max(1),
            planes: planes.into(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        self.planes.get(channel).map(Vec::as_slice)
    }

    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }

    /// Duration implied by frame count and rate.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for PcmChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmChunk")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels())
            .field("frames", &self.frames())
            .finish()
    }
}

/// Opaque encoded bytes as produced by a demuxer.
#[derive(Clone, PartialEq)]
pub struct EncodedPacket {
    pub codec: CodecId,
    pub keyframe: bool,
    pub data: Arc<[u8]>,
}

impl fmt::Debug for EncodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedPacket")
            .field("codec", &self.codec)
            .field("keyframe", &self.keyframe)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Sample contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Video(VideoFrame),
    Audio(PcmChunk),
    Packet(EncodedPacket),
}

/// Engine-side resources held on behalf of one sample.
pub trait SampleLease: Send {
    /// Return the resources to the engine.
    fn release(self: Box<Self>);
}

/// One timestamped unit of media.
///
/// A sample obtained from a [`SampleStream`] holds a lease on engine
/// resources. The lease is released exactly once: by [`Sample::close`] or,
/// failing that, when the sample is dropped. Copies made with
/// [`Sample::rebased`] or [`Sample::retimed`] share the payload but never
/// the lease.
pub struct Sample {
    timestamp: f64,
    duration: f64,
    payload: Payload,
    lease: Option<Box<dyn SampleLease>>,
}

impl Sample {
    /// A sample without engine resources (generated silence, re-timed copies).
    pub fn new(timestamp: f64, duration: f64, payload: Payload) -> Self {
        Self {
            timestamp,
            duration,
            payload,
            lease: None,
        }
    }

    /// A sample backed by engine resources.
    pub fn leased(
        timestamp: f64,
        duration: f64,
        payload: Payload,
        lease: Box<dyn SampleLease>,
    ) -> Self {
        Self {
            timestamp,
            duration,
            payload,
            lease: Some(lease),
        }
    }

    /// Start time in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// `timestamp + duration`.
    pub fn end(&self) -> f64 {
        self.timestamp + self.duration
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Decoded frame, if this is one.
    pub fn video_frame(&self) -> Option<&VideoFrame> {
        match &self.payload {
            Payload::Video(frame) => Some(frame),
            _ => None,
        }
    }

    /// Decoded PCM, if this is a chunk of it.
    pub fn pcm(&self) -> Option<&PcmChunk> {
        match &self.payload {
            Payload::Audio(pcm) => Some(pcm),
            _ => None,
        }
    }

    /// Copy shifted later by `offset` seconds.
    pub fn rebased(&self, offset: f64) -> Sample {
        self.retimed(self.timestamp + offset, self.duration)
    }

    /// Copy with new timing.
    pub fn retimed(&self, timestamp: f64, duration: f64) -> Sample {
        Sample::new(timestamp, duration, self.payload.clone())
    }

    /// Copy with the same timing and a new payload.
    pub fn with_payload(&self, payload: Payload) -> Sample {
        Sample::new(self.timestamp, self.duration, payload)
    }

    /// Whether this sample still holds engine resources.
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Release engine resources now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }
}

impl Drop for Sample {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("timestamp", &self.timestamp)
            .field("duration", &self.duration)
            .field("payload", &self.payload)
            .field("leased", &self.lease.is_some())
            .finish()
    }
}

/// A lazy, finite, forward-only sequence of samples from one track.
///
/// Streams are not restartable; ask the source for a new one instead.
/// Dropping the stream releases its decoder.
#[async_trait::async_trait]
pub trait SampleStream: Send {
    /// Pull the next sample, or `None` once the track is exhausted.
    async fn next_sample(&mut self) -> SpliceResult<Option<Sample>>;
}
