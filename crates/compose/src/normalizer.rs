//! Per-clip video normalization.
//!
//! A clip either goes straight to the output (its encoded packets are
//! forwarded) or through a re-encode stage: decode, transform, encode into a
//! temporary container, and reopen that container as the clip's source.

use serde::Serialize;
use splice_audio::conform_chunk;
use splice_common::error::{SpliceError, SpliceResult, TrackKind};
use splice_edit_model::dimension::FrameSize;
use splice_edit_model::rect::NormalizedRect;
use splice_media_engine::codec::{ContainerKind, VideoCodec};
use splice_media_engine::engine::{
    AudioTrackConfig, AudioTrackRef, MediaEngine, SampleMode, TrackId, VideoEncodeParams,
    VideoTrackConfig, VideoTrackRef,
};
use splice_media_engine::guard::{OutputHandle, SourceHandle};
use splice_media_engine::sample::{Payload, Sample, VideoFrame};

use crate::clip::ClipEdit;
use crate::progress::CancellationToken;
use crate::transform::{FrameTransform, Rescale};

/// Why a clip cannot be forwarded as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReencodeReason {
    DimensionsDiffer { source: FrameSize, target: FrameSize },
    Transform { name: String },
    Speed { factor: f64 },
    CodecMismatch { source: VideoCodec, output: VideoCodec },
    TrimStart { secs: f64 },
}

/// Path a clip takes to the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizePath {
    Direct,
    Reencode(Vec<ReencodeReason>),
}

impl NormalizePath {
    pub fn is_direct(&self) -> bool {
        matches!(self, NormalizePath::Direct)
    }
}

/// Decide Direct vs Re-encode for one clip.
pub fn plan_path(
    source_size: FrameSize,
    source_codec: VideoCodec,
    output_codec: VideoCodec,
    edit: &ClipEdit,
    target: FrameSize,
) -> NormalizePath {
    let mut reasons = Vec::new();
    if source_size != target {
        reasons.push(ReencodeReason::DimensionsDiffer {
            source: source_size,
            target,
        });
    }
    if let Some(transform) = &edit.transform {
        reasons.push(ReencodeReason::Transform {
            name: transform.name(),
        });
    }
    if edit.changes_speed() {
        reasons.push(ReencodeReason::Speed { factor: edit.speed });
    }
    if source_codec != output_codec {
        reasons.push(ReencodeReason::CodecMismatch {
            source: source_codec,
            output: output_codec,
        });
    }
    if edit.trim.trims_start() {
        reasons.push(ReencodeReason::TrimStart {
            secs: edit.trim.start_secs,
        });
    }
    if reasons.is_empty() {
        NormalizePath::Direct
    } else {
        NormalizePath::Reencode(reasons)
    }
}

/// Output frame size implied by the first clip.
///
/// An explicit resize wins, then a transform's preferred size (a crop),
/// then the first frame itself. Every result is even.
pub fn resolve_target_size(first_frame: FrameSize, edit: &ClipEdit) -> SpliceResult<FrameSize> {
    if let Some((width, height)) = edit.resize {
        return FrameSize::even(width, height);
    }
    if let Some(transform) = &edit.transform {
        if let Some(size) = transform.preferred_size(first_frame)? {
            return Ok(size);
        }
    }
    FrameSize::even(first_frame.width as f64, first_frame.height as f64)
}

/// Read the first decoded frame's size and release it.
pub async fn peek_frame_size(source: &mut SourceHandle, track: &VideoTrackRef) -> SpliceResult<FrameSize> {
    let mut stream = source.samples(track.id, SampleMode::Decoded).await?;
    let sample = stream.next_sample().await?.ok_or_else(|| {
        SpliceError::unsupported_input(format!("'{}' has no video frames", source.label()))
    })?;
    let size = sample
        .video_frame()
        .map(VideoFrame::size)
        .ok_or_else(|| SpliceError::decode(TrackKind::Video, "first sample is not a video frame"))?;
    sample.close();
    Ok(size)
}

/// Output format every clip is normalized to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeTarget {
    pub container: ContainerKind,
    pub size: FrameSize,
    pub codec: VideoCodec,
    pub frame_rate: f64,
    pub bitrate: u32,
    /// Audio format for retimed audio, when the job writes audio.
    pub audio: Option<AudioTrackConfig>,
}

/// Engine-produced container that is discarded when dropped.
struct TempContainer<'a> {
    engine: &'a dyn MediaEngine,
    bytes: Vec<u8>,
}

impl Drop for TempContainer<'_> {
    fn drop(&mut self) {
        self.engine.discard(&self.bytes);
    }
}

/// A clip ready to be drained into the output.
pub struct NormalizedClip<'a> {
    pub path: NormalizePath,
    pub source_size: FrameSize,
    /// Set when retiming the clip's audio failed part-way.
    pub audio_failure: Option<String>,
    original: SourceHandle,
    // Declared before `temp` so the source is disposed before its container
    // is discarded.
    reencoded: Option<SourceHandle>,
    temp: Option<TempContainer<'a>>,
    retimed: bool,
}

impl NormalizedClip<'_> {
    /// Source carrying the clip's (possibly re-encoded) video.
    pub fn video_source(&mut self) -> &mut SourceHandle {
        match &mut self.reencoded {
            Some(source) => source,
            None => &mut self.original,
        }
    }

    /// Source carrying the clip's audio.
    pub fn audio_source(&mut self) -> &mut SourceHandle {
        match &mut self.reencoded {
            Some(source) if self.retimed => source,
            _ => &mut self.original,
        }
    }

    /// Whether trim and speed are already baked into the re-encoded video.
    pub fn video_prepared(&self) -> bool {
        self.reencoded.is_some()
    }

    /// Whether trim and speed are already baked into the audio source.
    pub fn audio_prepared(&self) -> bool {
        self.retimed
    }

    /// Dispose the original and any temporary source, then discard the
    /// temporary container.
    pub fn dispose(self) {
        let Self {
            original,
            reencoded,
            temp,
            ..
        } = self;
        if let Some(source) = reencoded {
            source.dispose();
        }
        drop(temp);
        original.dispose();
    }
}

/// Brings each clip's video track to the job's output format.
pub struct TrackNormalizer<'a> {
    engine: &'a dyn MediaEngine,
    target: NormalizeTarget,
    cancel: CancellationToken,
}

impl<'a> TrackNormalizer<'a> {
    pub fn new(engine: &'a dyn MediaEngine, target: NormalizeTarget, cancel: CancellationToken) -> Self {
        Self {
            engine,
            target,
            cancel,
        }
    }

    pub fn target(&self) -> &NormalizeTarget {
        &self.target
    }

    /// Normalize one clip. The source is owned by the result from here on.
    pub async fn normalize(&self, mut source: SourceHandle, edit: &ClipEdit) -> SpliceResult<NormalizedClip<'a>> {
        let video = source.video_track().ok_or_else(|| {
            SpliceError::unsupported_input(format!("'{}' has no video track", source.label()))
        })?;
        let source_size = peek_frame_size(&mut source, &video).await?;
        let path = plan_path(source_size, video.codec, self.target.codec, edit, self.target.size);

        if path.is_direct() {
            tracing::debug!(clip = source.label(), size = %source_size, "Direct sample transfer");
            return Ok(NormalizedClip {
                path,
                source_size,
                audio_failure: None,
                original: source,
                reencoded: None,
                temp: None,
                retimed: false,
            });
        }
        tracing::info!(
            clip = source.label(),
            from = %source_size,
            to = %self.target.size,
            path = ?path,
            "Re-encoding clip"
        );

        let (reencoded, temp, audio_failure) = self.reencode(&mut source, &video, edit).await?;
        Ok(NormalizedClip {
            path,
            source_size,
            audio_failure,
            original: source,
            reencoded: Some(reencoded),
            temp: Some(temp),
            retimed: edit.retimes(),
        })
    }

    async fn reencode(
        &self,
        source: &mut SourceHandle,
        video: &VideoTrackRef,
        edit: &ClipEdit,
    ) -> SpliceResult<(SourceHandle, TempContainer<'a>, Option<String>)> {
        let target = &self.target;
        let audio = match (edit.retimes(), source.audio_track(), target.audio) {
            (true, Some(track), Some(config)) => Some((track, config)),
            _ => None,
        };

        let mut temp = OutputHandle::create(self.engine, target.container).await?;
        let video_out = temp.add_video_track(VideoTrackConfig {
            codec: target.codec,
            params: VideoEncodeParams {
                size: target.size,
                frame_rate: target.frame_rate,
                bitrate: target.bitrate,
            },
        })?;
        let audio_out = match &audio {
            Some((_, config)) => Some(temp.add_audio_track(*config)?),
            None => None,
        };
        temp.start().await?;

        let transform: &dyn FrameTransform = match &edit.transform {
            Some(transform) => transform.as_ref(),
            None => &Rescale,
        };
        let frames = self
            .reencode_video(source, video, edit, transform, &mut temp, video_out)
            .await?;
        if frames == 0 {
            return Err(SpliceError::unsupported_input(format!(
                "Trim window of '{}' keeps no video frames",
                source.label()
            )));
        }

        let mut audio_failure = None;
        if let (Some((track, config)), Some(audio_out)) = (audio, audio_out) {
            audio_failure = self
                .retime_audio(source, &track, config, edit, &mut temp, audio_out)
                .await?;
        }

        let bytes = temp.finalize().await?;
        let container = TempContainer {
            engine: self.engine,
            bytes: bytes.clone(),
        };
        let label = format!("{} (normalized)", source.label());
        let reopened = SourceHandle::open(self.engine, label, bytes).await?;
        Ok((reopened, container, audio_failure))
    }

    async fn reencode_video(
        &self,
        source: &mut SourceHandle,
        video: &VideoTrackRef,
        edit: &ClipEdit,
        transform: &dyn FrameTransform,
        temp: &mut OutputHandle,
        track: TrackId,
    ) -> SpliceResult<usize> {
        let mut stream = source.samples(video.id, SampleMode::Decoded).await?;
        let mut written = 0usize;
        while let Some(sample) = stream.next_sample().await? {
            self.cancel.check()?;
            let ts = sample.timestamp();
            if edit.trim.is_past(ts) {
                sample.close();
                break;
            }
            if !edit.trim.contains(ts) {
                sample.close();
                continue;
            }
            let frame = sample.video_frame().ok_or_else(|| {
                SpliceError::decode(TrackKind::Video, "decoder delivered a non-video sample")
            })?;
            let frame = transform.apply(frame, &NormalizedRect::FULL, self.target.size)?;
            let local = ((ts - edit.trim.start_secs) / edit.speed).max(0.0);
            let out = Sample::new(local, sample.duration() / edit.speed, Payload::Video(frame));
            sample.close();
            temp.append(track, out).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Retime the clip's audio into the temporary container.
    ///
    /// Each written sample lasts until the next one starts; the last keeps
    /// `duration / speed`. Chunks are conformed to `config`. A decode,
    /// format or append failure ends the track early and is returned as the
    /// failure message instead of an error.
    #[allow(clippy::too_many_arguments)]
    async fn retime_audio(
        &self,
        source: &mut SourceHandle,
        track: &AudioTrackRef,
        config: AudioTrackConfig,
        edit: &ClipEdit,
        temp: &mut OutputHandle,
        out_track: TrackId,
    ) -> SpliceResult<Option<String>> {
        let mut stream = match source.samples(track.id, SampleMode::Decoded).await {
            Ok(stream) => stream,
            Err(err) => return Ok(Some(err.to_string())),
        };
        let mut failure = None;
        let mut pending: Option<(f64, f64, Payload)> = None;
        loop {
            let sample = match stream.next_sample().await {
                Ok(Some(sample)) => sample,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(clip = source.label(), error = %err, "Audio decode failed while retiming");
                    failure = Some(err.to_string());
                    break;
                }
            };
            self.cancel.check()?;
            let ts = sample.timestamp();
            if edit.trim.is_past(ts) {
                sample.close();
                break;
            }
            if !edit.trim.contains(ts) {
                sample.close();
                continue;
            }
            let conformed = match sample.payload() {
                Payload::Audio(chunk) => conform_chunk(chunk, config.params.sample_rate, config.params.channels),
                _ => Err(SpliceError::decode(TrackKind::Audio, "decoder delivered a non-audio sample")),
            };
            let chunk = match conformed {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::warn!(clip = source.label(), error = %err, "Audio cannot be retimed into the output format");
                    sample.close();
                    failure = Some(err.to_string());
                    break;
                }
            };
            let local = ((ts - edit.trim.start_secs) / edit.speed).max(0.0);
            if let Some((start, _, payload)) = pending.take() {
                let duration = (local - start).max(0.0);
                if let Err(err) = temp.append(out_track, Sample::new(start, duration, payload)).await {
                    tracing::warn!(clip = source.label(), error = %err, "Retimed audio rejected");
                    sample.close();
                    return Ok(Some(err.to_string()));
                }
            }
            pending = Some((local, sample.duration() / edit.speed, Payload::Audio(chunk)));
            sample.close();
        }
        if let Some((start, duration, payload)) = pending {
            if let Err(err) = temp.append(out_track, Sample::new(start, duration, payload)).await {
                tracing::warn!(clip = source.label(), error = %err, "Retimed audio rejected");
                failure.get_or_insert_with(|| err.to_string());
            }
        }
        Ok(failure)
    }
}
