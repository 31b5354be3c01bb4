//! In-process media engine.
//!
//! Containers live in an engine-owned store and are addressed by small
//! opaque byte handles, so "container bytes" round-trip through
//! [`MediaEngine::open_input`] and [`OutputTarget::finalize`] without a real
//! muxer. Encoded packets carry the raw frame/PCM contents with a tiny header.
//!
//! The engine enforces the output contract (no tracks after start,
//! monotonic timestamps per track, packet codec matches track codec, frames
//! and PCM match the track format) and counts every resource it hands out in a
//! [`ResourceLedger`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use splice_common::error::{SpliceError, SpliceResult, TrackKind};
use splice_edit_model::dimension::FrameSize;

use crate::codec::{AudioCodec, CodecId, ContainerKind, VideoCodec};
use crate::engine::{
    AudioEncodeParams, AudioTrackConfig, AudioTrackRef, MediaEngine, MediaSource, OutputTarget,
    SampleMode, TrackId, VideoEncodeParams, VideoTrackConfig, VideoTrackRef,
};
use crate::sample::{EncodedPacket, Payload, PcmChunk, Sample, SampleLease, SampleStream, VideoFrame};

const HANDLE_MAGIC: &[u8; 8] = b"SPLCMEM1";
const VIDEO_TRACK: TrackId = TrackId(1);
const AUDIO_TRACK: TrackId = TrackId(2);
const TIMESTAMP_TOLERANCE: f64 = 1e-9;

/// Counters for every resource the engine hands out.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    sources_opened: AtomicU64,
    sources_disposed: AtomicU64,
    samples_issued: AtomicU64,
    samples_released: AtomicU64,
    outputs_created: AtomicU64,
    outputs_finalized: AtomicU64,
    outputs_cancelled: AtomicU64,
}

/// Point-in-time copy of a [`ResourceLedger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub sources_opened: u64,
    pub sources_disposed: u64,
    pub samples_issued: u64,
    pub samples_released: u64,
    pub outputs_created: u64,
    pub outputs_finalized: u64,
    pub outputs_cancelled: u64,
}

impl ResourceLedger {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            sources_opened: self.sources_opened.load(Ordering::SeqCst),
            sources_disposed: self.sources_disposed.load(Ordering::SeqCst),
            samples_issued: self.samples_issued.load(Ordering::SeqCst),
            samples_released: self.samples_released.load(Ordering::SeqCst),
            outputs_created: self.outputs_created.load(Ordering::SeqCst),
            outputs_finalized: self.outputs_finalized.load(Ordering::SeqCst),
            outputs_cancelled: self.outputs_cancelled.load(Ordering::SeqCst),
        }
    }
}

impl LedgerSnapshot {
    /// Every opened source was disposed.
    pub fn sources_balanced(&self) -> bool {
        self.sources_opened == self.sources_disposed
    }

    /// Every issued sample was released.
    pub fn samples_balanced(&self) -> bool {
        self.samples_issued == self.samples_released
    }

    /// Every created output was either finalized or cancelled.
    pub fn outputs_settled(&self) -> bool {
        self.outputs_created == self.outputs_finalized + self.outputs_cancelled
    }
}

/// Stored contents of one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredContent {
    Frame(VideoFrame),
    Pcm(PcmChunk),
}

/// One stored sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSample {
    pub timestamp: f64,
    pub duration: f64,
    pub keyframe: bool,
    pub content: StoredContent,
}

impl StoredSample {
    pub fn end(&self) -> f64 {
        self.timestamp + self.duration
    }

    pub fn frame(&self) -> Option<&VideoFrame> {
        match &self.content {
            StoredContent::Frame(frame) => Some(frame),
            StoredContent::Pcm(_) => None,
        }
    }

    pub fn pcm(&self) -> Option<&PcmChunk> {
        match &self.content {
            StoredContent::Pcm(pcm) => Some(pcm),
            StoredContent::Frame(_) => None,
        }
    }
}

/// Format of a stored track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackFormat {
    Video {
        codec: VideoCodec,
        frame_rate: Option<f64>,
    },
    Audio {
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
    },
}

impl TrackFormat {
    fn kind(&self) -> TrackKind {
        match self {
            TrackFormat::Video { .. } => TrackKind::Video,
            TrackFormat::Audio { .. } => TrackKind::Audio,
        }
    }

    fn codec(&self) -> CodecId {
        match self {
            TrackFormat::Video { codec, .. } => CodecId::Video(*codec),
            TrackFormat::Audio { codec, .. } => CodecId::Audio(*codec),
        }
    }
}

/// A stored track.
#[derive(Debug, Clone)]
pub struct MemoryTrack {
    pub format: TrackFormat,
    pub samples: Vec<StoredSample>,
    /// Fail decoding once this many samples have been delivered.
    pub fail_after: Option<usize>,
}

impl MemoryTrack {
    pub fn video(codec: VideoCodec, frame_rate: Option<f64>) -> Self {
        Self {
            format: TrackFormat::Video { codec, frame_rate },
            samples: Vec::new(),
            fail_after: None,
        }
    }

    pub fn audio(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            format: TrackFormat::Audio {
                codec,
                sample_rate,
                channels,
            },
            samples: Vec::new(),
            fail_after: None,
        }
    }

    /// Solid-color frames at a fixed rate.
    pub fn synthetic_video(
        codec: VideoCodec,
        size: FrameSize,
        fps: f64,
        duration_secs: f64,
        rgba: [u8; 4],
    ) -> Self {
        let mut track = Self::video(codec, Some(fps));
        let frame = VideoFrame::solid(size.width, size.height, rgba);
        let count = (duration_secs * fps).round() as usize;
        let gop = (fps.round() as usize).max(1);
        for i in 0..count {
            track.samples.push(StoredSample {
                timestamp: i as f64 / fps,
                duration: 1.0 / fps,
                keyframe: i % gop == 0,
                content: StoredContent::Frame(frame.clone()),
            });
        }
        track
    }

    /// Constant-level PCM split into fixed-size chunks.
    pub fn synthetic_audio(
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
        duration_secs: f64,
        chunk_frames: usize,
        level: f32,
    ) -> Self {
        let mut track = Self::audio(codec, sample_rate, channels);
        let total = (duration_secs * sample_rate as f64).round() as usize;
        let chunk_frames = chunk_frames.max(1);
        let mut written = 0usize;
        while written < total {
            let frames = chunk_frames.min(total - written);
            let planes = (0..channels.max(1)).map(|_| vec![level; frames]).collect();
            if let Ok(pcm) = PcmChunk::new(sample_rate, planes) {
                track.samples.push(StoredSample {
                    timestamp: written as f64 / sample_rate as f64,
                    duration: frames as f64 / sample_rate as f64,
                    keyframe: true,
                    content: StoredContent::Pcm(pcm),
                });
            }
            written += frames;
        }
        track
    }

    /// Inject a decode failure after `delivered` samples.
    pub fn failing_after(mut self, delivered: usize) -> Self {
        self.fail_after = Some(delivered);
        self
    }

    /// End of the last sample.
    pub fn duration_secs(&self) -> f64 {
        self.samples.iter().map(StoredSample::end).fold(0.0, f64::max)
    }
}

/// A stored container.
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    pub container: ContainerKind,
    pub video: Option<MemoryTrack>,
    pub audio: Option<MemoryTrack>,
}

impl MemoryContainer {
    pub fn new(container: ContainerKind) -> Self {
        Self {
            container,
            video: None,
            audio: None,
        }
    }

    pub fn with_video(mut self, track: MemoryTrack) -> Self {
        self.video = Some(track);
        self
    }

    pub fn with_audio(mut self, track: MemoryTrack) -> Self {
        self.audio = Some(track);
        self
    }

    fn track(&self, id: TrackId) -> Option<&MemoryTrack> {
        match id {
            VIDEO_TRACK => self.video.as_ref(),
            AUDIO_TRACK => self.audio.as_ref(),
            _ => None,
        }
    }
}

struct EngineShared {
    store: Mutex<HashMap<u64, Arc<MemoryContainer>>>,
    next_id: AtomicU64,
    ledger: Arc<ResourceLedger>,
    video_encoders: HashSet<VideoCodec>,
    audio_encoders: HashSet<AudioCodec>,
}

impl EngineShared {
    fn store(&self) -> MutexGuard<'_, HashMap<u64, Arc<MemoryContainer>>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, container: MemoryContainer) -> Vec<u8> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.store().insert(id, Arc::new(container));
        let mut handle = HANDLE_MAGIC.to_vec();
        handle.extend_from_slice(&id.to_le_bytes());
        handle
    }

    fn lookup(&self, bytes: &[u8]) -> Option<Arc<MemoryContainer>> {
        let id = handle_id(bytes)?;
        self.store().get(&id).cloned()
    }

    fn remove(&self, bytes: &[u8]) -> bool {
        handle_id(bytes).is_some_and(|id| self.store().remove(&id).is_some())
    }
}

fn handle_id(bytes: &[u8]) -> Option<u64> {
    let id = bytes.strip_prefix(HANDLE_MAGIC.as_slice())?;
    Some(u64::from_le_bytes(id.try_into().ok()?))
}

/// Deterministic engine backed by in-memory containers.
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<EngineShared>,
}

impl MemoryEngine {
    /// Engine that can encode every codec.
    pub fn new() -> Self {
        Self::with_encoders(&VideoCodec::ALL, &AudioCodec::ALL)
    }

    /// Engine that can only encode the listed codecs.
    pub fn with_encoders(video: &[VideoCodec], audio: &[AudioCodec]) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                ledger: Arc::new(ResourceLedger::default()),
                video_encoders: video.iter().copied().collect(),
                audio_encoders: audio.iter().copied().collect(),
            }),
        }
    }

    /// Store a container and return the bytes that open it.
    pub fn insert(&self, container: MemoryContainer) -> Vec<u8> {
        self.shared.insert(container)
    }

    /// Inspect the container behind `bytes`.
    pub fn container(&self, bytes: &[u8]) -> Option<Arc<MemoryContainer>> {
        self.shared.lookup(bytes)
    }

    /// Forget the container behind `bytes`. Sources already open keep
    /// reading it. Returns whether anything was stored.
    pub fn remove(&self, bytes: &[u8]) -> bool {
        self.shared.remove(bytes)
    }

    /// Number of containers currently stored.
    pub fn stored(&self) -> usize {
        self.shared.store().len()
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        self.shared.ledger.snapshot()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaEngine for MemoryEngine {
    async fn open_input(&self, bytes: Vec<u8>) -> SpliceResult<Box<dyn MediaSource>> {
        let data = self
            .shared
            .lookup(&bytes)
            .ok_or_else(|| SpliceError::unsupported_input("Unrecognized container bytes"))?;
        ResourceLedger::bump(&self.shared.ledger.sources_opened);
        Ok(Box::new(MemorySource {
            data,
            ledger: self.shared.ledger.clone(),
        }))
    }

    async fn create_output(&self, container: ContainerKind) -> SpliceResult<Box<dyn OutputTarget>> {
        ResourceLedger::bump(&self.shared.ledger.outputs_created);
        Ok(Box::new(MemoryOutput {
            shared: self.shared.clone(),
            container,
            started: false,
            video: None,
            audio: None,
        }))
    }

    async fn can_encode_video(&self, codec: VideoCodec, params: &VideoEncodeParams) -> bool {
        self.shared.video_encoders.contains(&codec) && params.size.is_encodable()
    }

    async fn can_encode_audio(&self, codec: AudioCodec, params: &AudioEncodeParams) -> bool {
        self.shared.audio_encoders.contains(&codec) && params.sample_rate > 0 && params.channels > 0
    }

    fn discard(&self, bytes: &[u8]) {
        if self.remove(bytes) {
            tracing::trace!(stored = self.stored(), "Discarded container");
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySource {
    data: Arc<MemoryContainer>,
    ledger: Arc<ResourceLedger>,
}

#[async_trait::async_trait]
impl MediaSource for MemorySource {
    fn video_tracks(&self) -> Vec<VideoTrackRef> {
        match self.data.video.as_ref().map(|t| (t.format, t.duration_secs())) {
            Some((TrackFormat::Video { codec, frame_rate }, duration)) => vec![VideoTrackRef {
                id: VIDEO_TRACK,
                codec,
                frame_rate,
                duration_secs: Some(duration),
            }],
            _ => Vec::new(),
        }
    }

    fn audio_tracks(&self) -> Vec<AudioTrackRef> {
        match self.data.audio.as_ref().map(|t| (t.format, t.duration_secs())) {
            Some((
                TrackFormat::Audio {
                    codec,
                    sample_rate,
                    channels,
                },
                duration,
            )) => vec![AudioTrackRef {
                id: AUDIO_TRACK,
                codec,
                sample_rate,
                channels,
                duration_secs: Some(duration),
            }],
            _ => Vec::new(),
        }
    }

    async fn samples(&mut self, track: TrackId, mode: SampleMode) -> SpliceResult<Box<dyn SampleStream>> {
        if self.data.track(track).is_none() {
            return Err(SpliceError::engine(format!("Source has no track {}", track.0)));
        }
        Ok(Box::new(MemoryStream {
            data: self.data.clone(),
            track,
            mode,
            cursor: 0,
            ledger: self.ledger.clone(),
        }))
    }

    fn dispose(self: Box<Self>) {
        ResourceLedger::bump(&self.ledger.sources_disposed);
    }
}

struct MemoryStream {
    data: Arc<MemoryContainer>,
    track: TrackId,
    mode: SampleMode,
    cursor: usize,
    ledger: Arc<ResourceLedger>,
}

struct LedgerLease(Arc<ResourceLedger>);

impl SampleLease for LedgerLease {
    fn release(self: Box<Self>) {
        ResourceLedger::bump(&self.0.samples_released);
    }
}

#[async_trait::async_trait]
impl SampleStream for MemoryStream {
    async fn next_sample(&mut self) -> SpliceResult<Option<Sample>> {
        let Some(track) = self.data.track(self.track) else {
            return Ok(None);
        };
        if track.fail_after.is_some_and(|n| self.cursor >= n) {
            return Err(SpliceError::decode(
                track.format.kind(),
                format!("injected failure after {} samples", self.cursor),
            ));
        }
        let Some(stored) = track.samples.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let payload = match (self.mode, &stored.content) {
            (SampleMode::Decoded, StoredContent::Frame(frame)) => Payload::Video(frame.clone()),
            (SampleMode::Decoded, StoredContent::Pcm(pcm)) => Payload::Audio(pcm.clone()),
            (SampleMode::Encoded, content) => Payload::Packet(EncodedPacket {
                codec: track.format.codec(),
                keyframe: stored.keyframe,
                data: encode_content(content).into(),
            }),
        };
        ResourceLedger::bump(&self.ledger.samples_issued);
        Ok(Some(Sample::leased(
            stored.timestamp,
            stored.duration,
            payload,
            Box::new(LedgerLease(self.ledger.clone())),
        )))
    }
}

struct OutputTrack {
    id: TrackId,
    format: TrackFormat,
    size: Option<FrameSize>,
    samples: Vec<StoredSample>,
    last_timestamp: f64,
}

impl OutputTrack {
    fn new(id: TrackId, format: TrackFormat, size: Option<FrameSize>) -> Self {
        Self {
            id,
            format,
            size,
            samples: Vec::new(),
            last_timestamp: f64::NEG_INFINITY,
        }
    }

    fn into_memory_track(self) -> MemoryTrack {
        MemoryTrack {
            format: self.format,
            samples: self.samples,
            fail_after: None,
        }
    }
}

struct MemoryOutput {
    shared: Arc<EngineShared>,
    container: ContainerKind,
    started: bool,
    video: Option<OutputTrack>,
    audio: Option<OutputTrack>,
}

impl MemoryOutput {
    fn ensure_not_started(&self) -> SpliceResult<()> {
        if self.started {
            return Err(SpliceError::engine(
                "Cannot add tracks after the output has started",
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl OutputTarget for MemoryOutput {
    fn add_video_track(&mut self, config: VideoTrackConfig) -> SpliceResult<TrackId> {
        self.ensure_not_started()?;
        if self.video.is_some() {
            return Err(SpliceError::engine("Output already has a video track"));
        }
        if !self.container.supports_video(config.codec) {
            return Err(SpliceError::encode(format!(
                "{} cannot carry {} video",
                self.container, config.codec
            )));
        }
        self.video = Some(OutputTrack::new(
            VIDEO_TRACK,
            TrackFormat::Video {
                codec: config.codec,
                frame_rate: Some(config.params.frame_rate),
            },
            Some(config.params.size),
        ));
        Ok(VIDEO_TRACK)
    }

    fn add_audio_track(&mut self, config: AudioTrackConfig) -> SpliceResult<TrackId> {
        self.ensure_not_started()?;
        if self.audio.is_some() {
            return Err(SpliceError::engine("Output already has an audio track"));
        }
        if !self.container.supports_audio(config.codec) {
            return Err(SpliceError::encode(format!(
                "{} cannot carry {} audio",
                self.container, config.codec
            )));
        }
        self.audio = Some(OutputTrack::new(
            AUDIO_TRACK,
            TrackFormat::Audio {
                codec: config.codec,
                sample_rate: config.params.sample_rate,
                channels: config.params.channels,
            },
            None,
        ));
        Ok(AUDIO_TRACK)
    }

    async fn start(&mut self) -> SpliceResult<()> {
        if self.video.is_none() && self.audio.is_none() {
            return Err(SpliceError::engine("Output has no tracks"));
        }
        self.started = true;
        Ok(())
    }

    async fn append(&mut self, track: TrackId, sample: Sample) -> SpliceResult<()> {
        if !self.started {
            return Err(SpliceError::engine("Output has not been started"));
        }
        let out = [self.video.as_mut(), self.audio.as_mut()]
            .into_iter()
            .flatten()
            .find(|t| t.id == track)
            .ok_or_else(|| SpliceError::engine(format!("Output has no track {}", track.0)))?;

        let timestamp = sample.timestamp();
        if !timestamp.is_finite() || timestamp + TIMESTAMP_TOLERANCE < out.last_timestamp {
            return Err(SpliceError::encode(format!(
                "Non-monotonic timestamp {timestamp} after {} on {} track",
                out.last_timestamp,
                out.format.kind()
            )));
        }

        let (content, keyframe) = match (sample.payload(), out.format) {
            (Payload::Video(frame), TrackFormat::Video { .. }) => {
                (StoredContent::Frame(frame.clone()), true)
            }
            (Payload::Audio(pcm), TrackFormat::Audio { .. }) => (StoredContent::Pcm(pcm.clone()), true),
            (Payload::Packet(packet), format) if packet.codec == format.codec() => {
                (decode_content(&packet.data)?, packet.keyframe)
            }
            (Payload::Packet(packet), format) => {
                return Err(SpliceError::encode(format!(
                    "Packet codec {:?} does not match track codec {:?}",
                    packet.codec,
                    format.codec()
                )));
            }
            (_, format) => {
                return Err(SpliceError::encode(format!(
                    "Payload does not belong on a {} track",
                    format.kind()
                )));
            }
        };

        if let (StoredContent::Frame(frame), Some(size)) = (&content, out.size) {
            if frame.size() != size {
                return Err(SpliceError::encode(format!(
                    "Frame {} does not match track size {size}",
                    frame.size()
                )));
            }
        }
        if let (
            StoredContent::Pcm(pcm),
            TrackFormat::Audio {
                sample_rate,
                channels,
                ..
            },
        ) = (&content, out.format)
        {
            if pcm.sample_rate() != sample_rate || pcm.channels() != channels {
                return Err(SpliceError::encode(format!(
                    "{} Hz x{} audio does not match track format {sample_rate} Hz x{channels}",
                    pcm.sample_rate(),
                    pcm.channels()
                )));
            }
        }

        out.last_timestamp = timestamp;
        out.samples.push(StoredSample {
            timestamp,
            duration: sample.duration().max(0.0),
            keyframe,
            content,
        });
        Ok(())
    }

    async fn finalize(self: Box<Self>) -> SpliceResult<Vec<u8>> {
        let written = [self.video.as_ref(), self.audio.as_ref()]
            .into_iter()
            .flatten()
            .map(|t| t.samples.len())
            .sum::<usize>();
        if !self.started || written == 0 {
            return Err(SpliceError::NoDataProduced);
        }
        let this = *self;
        let container = MemoryContainer {
            container: this.container,
            video: this.video.map(OutputTrack::into_memory_track),
            audio: this.audio.map(OutputTrack::into_memory_track),
        };
        ResourceLedger::bump(&this.shared.ledger.outputs_finalized);
        Ok(this.shared.insert(container))
    }

    fn cancel(self: Box<Self>) {
        ResourceLedger::bump(&self.shared.ledger.outputs_cancelled);
    }
}

const FRAME_TAG: u8 = 0;
const PCM_TAG: u8 = 1;

fn encode_content(content: &StoredContent) -> Vec<u8> {
    match content {
        StoredContent::Frame(frame) => {
            let mut out = Vec::with_capacity(9 + frame.data().len());
            out.push(FRAME_TAG);
            out.extend_from_slice(&frame.width().to_le_bytes());
            out.extend_from_slice(&frame.height().to_le_bytes());
            out.extend_from_slice(frame.data());
            out
        }
        StoredContent::Pcm(pcm) => {
            let mut out = Vec::with_capacity(11 + pcm.frames() * pcm.channels() as usize * 4);
            out.push(PCM_TAG);
            out.extend_from_slice(&pcm.sample_rate().to_le_bytes());
            out.extend_from_slice(&pcm.channels().to_le_bytes());
            out.extend_from_slice(&(pcm.frames() as u32).to_le_bytes());
            for plane in pcm.planes() {
                for s in plane {
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
            out
        }
    }
}

fn decode_content(bytes: &[u8]) -> SpliceResult<StoredContent> {
    let corrupt = || SpliceError::encode("Corrupt packet");
    let u32_at = |at: usize| -> SpliceResult<u32> {
        let raw = bytes.get(at..at + 4).ok_or_else(corrupt)?;
        Ok(u32::from_le_bytes(raw.try_into().map_err(|_| corrupt())?))
    };
    match bytes.first() {
        Some(&FRAME_TAG) => {
            let width = u32_at(1)?;
            let height = u32_at(5)?;
            let frame = VideoFrame::new(width, height, bytes.get(9..).ok_or_else(corrupt)?.to_vec())?;
            Ok(StoredContent::Frame(frame))
        }
        Some(&PCM_TAG) => {
            let sample_rate = u32_at(1)?;
            let channels = bytes
                .get(5..7)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .ok_or_else(corrupt)? as usize;
            let frames = u32_at(7)? as usize;
            let body = bytes.get(11..).ok_or_else(corrupt)?;
            if body.len() != channels * frames * 4 {
                return Err(corrupt());
            }
            let planes = body
                .chunks_exact(frames.max(1) * 4)
                .take(channels)
                .map(|plane| {
                    plane
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect()
                })
                .collect::<Vec<Vec<f32>>>();
            let planes = if frames == 0 {
                vec![Vec::new(); channels]
            } else {
                planes
            };
            Ok(StoredContent::Pcm(PcmChunk::new(sample_rate, planes)?))
        }
        _ => Err(corrupt()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_params(size: FrameSize) -> VideoEncodeParams {
        VideoEncodeParams {
            size,
            frame_rate: 30.0,
            bitrate: 1_000_000,
        }
    }

    fn clip(engine: &MemoryEngine) -> Vec<u8> {
        engine.insert(
            MemoryContainer::new(ContainerKind::Mp4)
                .with_video(MemoryTrack::synthetic_video(
                    VideoCodec::Avc,
                    FrameSize::new(4, 2),
                    10.0,
                    1.0,
                    [10, 20, 30, 255],
                ))
                .with_audio(MemoryTrack::synthetic_audio(
                    AudioCodec::Aac,
                    8000,
                    2,
                    1.0,
                    1000,
                    0.25,
                )),
        )
    }

    #[tokio::test]
    async fn test_open_unknown_bytes_is_unsupported() {
        let engine = MemoryEngine::new();
        let err = engine.open_input(b"not a container".to_vec()).await.err().unwrap();
        assert!(matches!(err, SpliceError::UnsupportedInput { .. }));
    }

    #[tokio::test]
    async fn test_stream_counts_leases() {
        let engine = MemoryEngine::new();
        let mut source = engine.open_input(clip(&engine)).await.unwrap();
        let track = source.video_tracks()[0].id;
        let mut stream = source.samples(track, SampleMode::Decoded).await.unwrap();
        let mut count = 0;
        while let Some(sample) = stream.next_sample().await.unwrap() {
            assert!(sample.video_frame().is_some());
            sample.close();
            count += 1;
        }
        drop(stream);
        source.dispose();
        let ledger = engine.ledger();
        assert_eq!(count, 10);
        assert_eq!(ledger.samples_issued, 10);
        assert!(ledger.samples_balanced());
        assert!(ledger.sources_balanced());
    }

    #[tokio::test]
    async fn test_encoded_packets_round_trip_through_output() {
        let engine = MemoryEngine::new();
        let mut source = engine.open_input(clip(&engine)).await.unwrap();
        let audio = source.audio_tracks()[0].clone();
        let mut output = engine.create_output(ContainerKind::Mp4).await.unwrap();
        let track = output
            .add_audio_track(AudioTrackConfig {
                codec: AudioCodec::Aac,
                params: AudioEncodeParams {
                    sample_rate: 8000,
                    channels: 2,
                    bitrate: 64_000,
                },
            })
            .unwrap();
        output.start().await.unwrap();
        let mut stream = source.samples(audio.id, SampleMode::Encoded).await.unwrap();
        while let Some(sample) = stream.next_sample().await.unwrap() {
            output.append(track, sample.rebased(0.0)).await.unwrap();
            sample.close();
        }
        source.dispose();
        let bytes = output.finalize().await.unwrap();
        let written = engine.container(&bytes).unwrap();
        let audio_track = written.audio.as_ref().unwrap();
        assert_eq!(audio_track.samples.len(), 8);
        assert_eq!(audio_track.samples[0].pcm().unwrap().plane(1).unwrap()[0], 0.25);
    }

    #[tokio::test]
    async fn test_output_rejects_tracks_after_start_and_backwards_time() {
        let engine = MemoryEngine::new();
        let mut output = engine.create_output(ContainerKind::Mp4).await.unwrap();
        let size = FrameSize::new(4, 2);
        let track = output
            .add_video_track(VideoTrackConfig {
                codec: VideoCodec::Avc,
                params: video_params(size),
            })
            .unwrap();
        output.start().await.unwrap();
        assert!(output
            .add_audio_track(AudioTrackConfig {
                codec: AudioCodec::Aac,
                params: AudioEncodeParams {
                    sample_rate: 8000,
                    channels: 1,
                    bitrate: 32_000
                },
            })
            .is_err());

        let frame = Payload::Video(VideoFrame::solid(4, 2, [0, 0, 0, 255]));
        output.append(track, Sample::new(1.0, 0.1, frame.clone())).await.unwrap();
        assert!(output.append(track, Sample::new(0.5, 0.1, frame)).await.is_err());

        let wrong_size = Payload::Video(VideoFrame::solid(2, 2, [0, 0, 0, 255]));
        assert!(output.append(track, Sample::new(2.0, 0.1, wrong_size)).await.is_err());
        output.cancel();
        assert!(engine.ledger().outputs_settled());
    }

    #[tokio::test]
    async fn test_output_rejects_pcm_in_another_format() {
        let engine = MemoryEngine::new();
        let mut output = engine.create_output(ContainerKind::Mp4).await.unwrap();
        let track = output
            .add_audio_track(AudioTrackConfig {
                codec: AudioCodec::Aac,
                params: AudioEncodeParams {
                    sample_rate: 8000,
                    channels: 1,
                    bitrate: 32_000,
                },
            })
            .unwrap();
        output.start().await.unwrap();
        let fast = PcmChunk::new(16000, vec![vec![0.0; 160]]).unwrap();
        assert!(output.append(track, Sample::new(0.0, 0.01, Payload::Audio(fast))).await.is_err());
        let stereo = PcmChunk::new(8000, vec![vec![0.0; 80], vec![0.0; 80]]).unwrap();
        assert!(output.append(track, Sample::new(0.0, 0.01, Payload::Audio(stereo))).await.is_err());
        let mono = PcmChunk::new(8000, vec![vec![0.0; 80]]).unwrap();
        output.append(track, Sample::new(0.0, 0.01, Payload::Audio(mono))).await.unwrap();
        output.cancel();
    }

    #[tokio::test]
    async fn test_removed_container_no_longer_opens() {
        let engine = MemoryEngine::new();
        let bytes = clip(&engine);
        let kept = clip(&engine);
        let mut source = engine.open_input(bytes.clone()).await.unwrap();
        assert_eq!(engine.stored(), 2);

        assert!(engine.remove(&bytes));
        assert!(!engine.remove(&bytes));
        assert_eq!(engine.stored(), 1);
        assert!(engine.container(&bytes).is_none());
        assert!(engine.open_input(bytes.clone()).await.is_err());
        assert!(engine.container(&kept).is_some());

        let track = source.video_tracks()[0].id;
        let mut stream = source.samples(track, SampleMode::Decoded).await.unwrap();
        let sample = stream.next_sample().await.unwrap().unwrap();
        sample.close();
        drop(stream);
        source.dispose();

        engine.discard(b"not a handle");
        engine.discard(&kept);
        assert_eq!(engine.stored(), 0);
    }

    #[tokio::test]
    async fn test_finalize_without_samples_produces_no_data() {
        let engine = MemoryEngine::new();
        let mut output = engine.create_output(ContainerKind::Webm).await.unwrap();
        output
            .add_video_track(VideoTrackConfig {
                codec: VideoCodec::Vp9,
                params: video_params(FrameSize::new(2, 2)),
            })
            .unwrap();
        output.start().await.unwrap();
        assert!(matches!(output.finalize().await, Err(SpliceError::NoDataProduced)));
    }

    #[tokio::test]
    async fn test_injected_failure_surfaces_as_decode_error() {
        let engine = MemoryEngine::new();
        let bytes = engine.insert(MemoryContainer::new(ContainerKind::Mp4).with_audio(
            MemoryTrack::synthetic_audio(AudioCodec::Aac, 8000, 1, 1.0, 4000, 0.1).failing_after(1),
        ));
        let mut source = engine.open_input(bytes).await.unwrap();
        let id = source.audio_tracks()[0].id;
        let mut stream = source.samples(id, SampleMode::Decoded).await.unwrap();
        stream.next_sample().await.unwrap().unwrap().close();
        let err = stream.next_sample().await.unwrap_err();
        assert!(matches!(
            err,
            SpliceError::DecodeFailure {
                track: TrackKind::Audio,
                ..
            }
        ));
        source.dispose();
    }

    #[tokio::test]
    async fn test_capability_honours_encoder_list() {
        let engine = MemoryEngine::with_encoders(&[VideoCodec::Vp9], &[]);
        let params = video_params(FrameSize::new(1280, 720));
        assert!(!engine.can_encode_video(VideoCodec::Avc, &params).await);
        assert!(engine.can_encode_video(VideoCodec::Vp9, &params).await);
        let odd = video_params(FrameSize::new(1281, 720));
        assert!(!engine.can_encode_video(VideoCodec::Vp9, &odd).await);
    }
}
