//! Timeline assembly.
//!
//! The assembler owns one job: it opens every clip, negotiates the output
//! format from the first clip, then drains each normalized clip into a
//! single output, shifting timestamps by a cursor that advances by each
//! clip's span.
//!
//! Video failures abort the job. Audio is best-effort: whatever could not
//! be read is replaced by silence so the tracks stay in sync.

use serde::Serialize;
use splice_audio::{conform_chunk, decode_track, match_duration, mix, PcmBuffer};
use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::dimension::FrameSize;
use splice_edit_model::time_range::TimeRange;
use splice_media_engine::codec::{AudioCodec, ContainerKind, VideoCodec};
use splice_media_engine::engine::{
    select_audio_codec, select_video_codec, AudioEncodeParams, AudioTrackConfig, MediaEngine,
    SampleMode, TrackId, VideoEncodeParams, VideoTrackConfig,
};
use splice_media_engine::guard::{OutputHandle, SourceHandle};
use splice_media_engine::sample::{Payload, Sample};

use crate::clip::{AudioEdit, ClipEdit, ClipInput};
use crate::job::OutputSettings;
use crate::normalizer::{
    peek_frame_size, resolve_target_size, NormalizePath, NormalizeTarget, NormalizedClip,
    TrackNormalizer,
};
use crate::progress::{CancellationToken, ProgressCallback, ProgressReporter, ProgressStage};

/// How a clip's audio ended up in the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioOutcome {
    /// The job writes no audio track.
    None,
    /// Copied from the clip.
    Source,
    /// The clip has no audio; silence was written.
    Silence,
    Muted,
    Replaced,
    Blended,
    /// Audio failed part-way; the rest of the span is silence.
    Fallback { error: String },
}

/// What happened to one clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipSummary {
    pub label: String,
    pub path: NormalizePath,
    /// Position of the clip on the output timeline.
    pub start_secs: f64,
    pub span_secs: f64,
    pub audio: AudioOutcome,
}

/// Result of a finished composition.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionReport {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub container: ContainerKind,
    pub frame_size: FrameSize,
    pub frame_rate: f64,
    pub video_codec: VideoCodec,
    pub audio_codec: Option<AudioCodec>,
    pub duration_secs: f64,
    pub clips: Vec<ClipSummary>,
}

/// Drains clips into one output container.
pub struct Assembler<'a> {
    engine: &'a dyn MediaEngine,
    settings: OutputSettings,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

/// Output audio track and its format.
#[derive(Clone, Copy)]
struct AudioSink {
    track: TrackId,
    config: AudioTrackConfig,
}

/// Audio written so far for one clip.
struct ClipAudio {
    /// Clip-local end of the last accepted sample.
    end: f64,
    failure: Option<String>,
}

impl ClipAudio {
    fn new(failure: Option<String>) -> Self {
        Self { end: 0.0, failure }
    }

    fn fail(&mut self, clip: &str, err: &SpliceError) {
        tracing::warn!(
            clip,
            error = %err,
            written_secs = self.end,
            "Audio failed mid-clip, filling the rest with silence"
        );
        self.failure.get_or_insert_with(|| err.to_string());
    }

    fn outcome(self, clean: AudioOutcome) -> AudioOutcome {
        match self.failure {
            Some(error) => AudioOutcome::Fallback { error },
            None => clean,
        }
    }
}

impl<'a> Assembler<'a> {
    pub fn new(engine: &'a dyn MediaEngine, settings: OutputSettings) -> Self {
        Self {
            engine,
            settings,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Token that stops this assembler's job.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the job.
    ///
    /// On any error the output is cancelled and every opened source is
    /// disposed before the error is returned.
    pub async fn compose(mut self, clips: Vec<ClipInput>) -> SpliceResult<CompositionReport> {
        tracing::info!(
            engine = self.engine.name(),
            clips = clips.len(),
            container = %self.settings.container,
            quality = ?self.settings.quality,
            "Starting composition"
        );
        let mut progress = ProgressReporter::new(
            self.progress.take(),
            self.settings.work_ceiling_percent,
            clips.len(),
        );
        match self.run(clips, &mut progress).await {
            Ok(report) => {
                tracing::info!(
                    duration_secs = report.duration_secs,
                    size = %report.frame_size,
                    bytes = report.bytes.len(),
                    "Composition complete"
                );
                Ok(report)
            }
            Err(err) if err.is_cancelled() => {
                tracing::info!("Composition cancelled");
                Err(err)
            }
            Err(err) => {
                tracing::error!(error = %err, "Composition failed");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        clips: Vec<ClipInput>,
        progress: &mut ProgressReporter,
    ) -> SpliceResult<CompositionReport> {
        if clips.is_empty() {
            return Err(SpliceError::unsupported_input("Nothing to compose: no clips given"));
        }
        for clip in &clips {
            clip.edit.validate()?;
        }
        progress.preparing();

        let mut labels = Vec::with_capacity(clips.len());
        let mut edits = Vec::with_capacity(clips.len());
        let mut sources = Vec::with_capacity(clips.len());
        for clip in clips {
            self.cancel.check()?;
            sources.push(SourceHandle::open(self.engine, clip.label.clone(), clip.bytes).await?);
            labels.push(clip.label);
            edits.push(clip.edit);
        }
        for source in &sources {
            if source.video_track().is_none() {
                return Err(SpliceError::unsupported_input(format!(
                    "Clip '{}' has no video track",
                    source.label()
                )));
            }
        }

        let target = self.negotiate(&mut sources, &edits).await?;
        self.check_regions(&mut sources, &edits, target.size).await?;
        let container = self.settings.container;

        let mut output = OutputHandle::create(self.engine, container).await?;
        let video_track = output.add_video_track(VideoTrackConfig {
            codec: target.codec,
            params: VideoEncodeParams {
                size: target.size,
                frame_rate: target.frame_rate,
                bitrate: target.bitrate,
            },
        })?;
        let audio = match target.audio {
            Some(config) => Some(AudioSink {
                track: output.add_audio_track(config)?,
                config,
            }),
            None => None,
        };
        output.start().await?;

        let normalizer = TrackNormalizer::new(self.engine, target, self.cancel.clone());
        let mut cursor = 0.0f64;
        let mut summaries = Vec::with_capacity(labels.len());
        let mut pending = sources.into_iter();

        for (index, (label, edit)) in labels.iter().zip(&edits).enumerate() {
            let Some(source) = pending.next() else {
                break;
            };
            self.cancel.check()?;
            progress.clip(ProgressStage::Normalizing, index, 0.0);
            let mut clip = normalizer.normalize(source, edit).await?;

            let span = self
                .write_video(&mut output, video_track, &mut clip, edit, cursor, index, progress)
                .await?;
            if span <= 0.0 {
                tracing::warn!(clip = %label, "Clip produced no video");
            }
            let audio_outcome = match audio {
                Some(sink) => self.write_audio(&mut output, sink, &mut clip, edit, cursor, span).await?,
                None => AudioOutcome::None,
            };

            tracing::info!(
                clip = %label,
                start_secs = cursor,
                span_secs = span,
                direct = clip.path.is_direct(),
                audio = ?audio_outcome,
                "Clip written"
            );
            summaries.push(ClipSummary {
                label: label.clone(),
                path: clip.path.clone(),
                start_secs: cursor,
                span_secs: span,
                audio: audio_outcome,
            });
            clip.dispose();
            cursor += span;
            progress.clip(ProgressStage::Writing, index, 1.0);
        }

        self.cancel.check()?;
        progress.finalizing();
        let bytes = output.finalize().await?;
        progress.complete();

        Ok(CompositionReport {
            bytes,
            container,
            frame_size: target.size,
            frame_rate: target.frame_rate,
            video_codec: target.codec,
            audio_codec: target.audio.map(|a| a.codec),
            duration_secs: cursor,
            clips: summaries,
        })
    }

    /// Fix output size, rate, codecs and bitrates before writing starts.
    async fn negotiate(
        &self,
        sources: &mut [SourceHandle],
        edits: &[ClipEdit],
    ) -> SpliceResult<NormalizeTarget> {
        let settings = &self.settings;
        let first = &mut sources[0];
        let first_video = first.video_track().ok_or_else(|| {
            SpliceError::unsupported_input(format!("Clip '{}' has no video track", first.label()))
        })?;
        let first_size = peek_frame_size(first, &first_video).await?;
        let size = resolve_target_size(first_size, &edits[0])?;
        for (source, edit) in sources.iter().zip(edits).skip(1) {
            if edit.resize.is_some() {
                tracing::warn!(
                    clip = source.label(),
                    "Resize on a later clip is ignored; the first clip sets the output size"
                );
            }
        }

        let frame_rate = first_video
            .frame_rate
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(settings.fallback_fps);
        let bitrate = settings.quality.video_bitrate(size, frame_rate);
        let video_params = VideoEncodeParams {
            size,
            frame_rate,
            bitrate,
        };
        let codec =
            select_video_codec(self.engine, settings.container, &settings.video_codecs, &video_params)
                .await?;

        let wants_audio = sources.iter().zip(edits).any(|(source, edit)| match edit.audio {
            AudioEdit::Mute => false,
            AudioEdit::Keep => source.audio_track().is_some(),
            AudioEdit::Replace(_) | AudioEdit::Blend { .. } => true,
        });
        let audio = if wants_audio {
            let (sample_rate, channels) = sources
                .iter()
                .find_map(|s| s.audio_track().map(|t| (t.sample_rate, t.channels)))
                .or_else(|| {
                    edits
                        .iter()
                        .find_map(|e| e.audio.external_buffer())
                        .map(|b| (b.sample_rate(), b.channel_count()))
                })
                .unwrap_or((settings.fallback_sample_rate, settings.fallback_channels));
            for (source, edit) in sources.iter().zip(edits) {
                let Some(buffer) = edit.audio.external_buffer() else {
                    continue;
                };
                if buffer.sample_rate() != sample_rate {
                    return Err(SpliceError::incompatible_format(format!(
                        "Clip '{}' brings {} Hz audio but the output is {} Hz",
                        source.label(),
                        buffer.sample_rate(),
                        sample_rate
                    )));
                }
            }
            let params = AudioEncodeParams {
                sample_rate,
                channels,
                bitrate: settings.quality.audio_bitrate(channels),
            };
            let codec =
                select_audio_codec(self.engine, settings.container, &settings.audio_codecs, &params)
                    .await?;
            Some(AudioTrackConfig { codec, params })
        } else {
            None
        };

        tracing::info!(
            size = %size,
            frame_rate,
            video_codec = %codec,
            video_bitrate = bitrate,
            audio_codec = ?audio.map(|a| a.codec),
            "Output format negotiated"
        );
        Ok(NormalizeTarget {
            container: settings.container,
            size,
            codec,
            frame_rate,
            bitrate,
            audio,
        })
    }

    /// Check every clip's transform regions against its first frame.
    async fn check_regions(
        &self,
        sources: &mut [SourceHandle],
        edits: &[ClipEdit],
        target: FrameSize,
    ) -> SpliceResult<()> {
        for (source, edit) in sources.iter_mut().zip(edits) {
            let Some(transform) = &edit.transform else {
                continue;
            };
            let video = source.video_track().ok_or_else(|| {
                SpliceError::unsupported_input(format!("Clip '{}' has no video track", source.label()))
            })?;
            let size = peek_frame_size(source, &video).await?;
            if let Err(err) = transform.check_regions(size, target, self.settings.min_region_px) {
                tracing::warn!(
                    clip = source.label(),
                    transform = %transform.name(),
                    size = %size,
                    min_px = self.settings.min_region_px,
                    "Transform region too small"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Copy the clip's video at `cursor`. Returns the clip span.
    #[allow(clippy::too_many_arguments)]
    async fn write_video(
        &self,
        output: &mut OutputHandle,
        track: TrackId,
        clip: &mut NormalizedClip<'_>,
        edit: &ClipEdit,
        cursor: f64,
        index: usize,
        progress: &mut ProgressReporter,
    ) -> SpliceResult<f64> {
        let window = if clip.video_prepared() {
            TimeRange::full()
        } else {
            edit.trim
        };
        let source = clip.video_source();
        let video = source.video_track().ok_or_else(|| {
            SpliceError::unsupported_input(format!("Clip '{}' lost its video track", source.label()))
        })?;
        let expected = video
            .duration_secs
            .map(|d| window.duration().map_or(d, |w| w.min(d)))
            .filter(|d| *d > 0.0);

        let mut stream = source.samples(video.id, SampleMode::Encoded).await?;
        let mut span = 0.0f64;
        while let Some(sample) = stream.next_sample().await? {
            self.cancel.check()?;
            let local = sample.timestamp().max(0.0);
            if window.is_past(local) {
                sample.close();
                break;
            }
            let duration = sample.duration().max(0.0);
            let out = sample.retimed(cursor + local, duration);
            sample.close();
            output.append(track, out).await?;
            span = span.max(local + duration);
            if let Some(total) = expected {
                progress.clip(ProgressStage::Writing, index, span / total);
            }
        }
        Ok(span)
    }

    /// Write the clip's audio for `[cursor, cursor + span)`.
    ///
    /// Only cancellation is returned as an error. Anything else that goes
    /// wrong ends the clip's audio early and the rest of the span is silence.
    async fn write_audio(
        &self,
        output: &mut OutputHandle,
        sink: AudioSink,
        clip: &mut NormalizedClip<'_>,
        edit: &ClipEdit,
        cursor: f64,
        span: f64,
    ) -> SpliceResult<AudioOutcome> {
        let channels = sink.config.params.channels;
        match &edit.audio {
            AudioEdit::Mute => {
                let mut state = ClipAudio::new(None);
                let label = clip.audio_source().label().to_string();
                self.pad_silence(output, sink, cursor, span, &mut state, &label).await?;
                Ok(state.outcome(AudioOutcome::Muted))
            }
            AudioEdit::Replace(buffer) => {
                let mut state = ClipAudio::new(None);
                let label = clip.audio_source().label().to_string();
                let buffer = match_duration(buffer.with_channel_count(channels), span);
                self.write_buffer(output, sink, &buffer, cursor, &mut state, &label).await?;
                self.pad_silence(output, sink, cursor, span, &mut state, &label).await?;
                Ok(state.outcome(AudioOutcome::Replaced))
            }
            AudioEdit::Blend {
                other,
                gain_clip,
                gain_other,
            } => {
                self.write_blend(output, sink, clip, other, *gain_clip, *gain_other, cursor, span)
                    .await
            }
            AudioEdit::Keep => self.copy_audio(output, sink, clip, edit, cursor, span).await,
        }
    }

    async fn copy_audio(
        &self,
        output: &mut OutputHandle,
        sink: AudioSink,
        clip: &mut NormalizedClip<'_>,
        edit: &ClipEdit,
        cursor: f64,
        span: f64,
    ) -> SpliceResult<AudioOutcome> {
        let window = if clip.audio_prepared() {
            TimeRange::full()
        } else {
            edit.trim
        };
        let mut state = ClipAudio::new(clip.audio_failure.clone());
        let source = clip.audio_source();
        let label = source.label().to_string();
        let Some(track) = source.audio_track() else {
            self.pad_silence(output, sink, cursor, span, &mut state, &label).await?;
            return Ok(state.outcome(AudioOutcome::Silence));
        };
        let params = sink.config.params;
        if track.sample_rate != params.sample_rate {
            let err = SpliceError::incompatible_format(format!(
                "Clip audio is {} Hz but the output is {} Hz",
                track.sample_rate, params.sample_rate
            ));
            state.fail(&label, &err);
            self.pad_silence(output, sink, cursor, span, &mut state, &label).await?;
            return Ok(state.outcome(AudioOutcome::Source));
        }
        let mode = if track.codec == sink.config.codec && track.channels == params.channels {
            SampleMode::Encoded
        } else {
            SampleMode::Decoded
        };

        match source.samples(track.id, mode).await {
            Ok(mut stream) => loop {
                let sample = match stream.next_sample().await {
                    Ok(Some(sample)) => sample,
                    Ok(None) => break,
                    Err(err) => {
                        state.fail(&label, &err);
                        break;
                    }
                };
                self.cancel.check()?;
                let local = sample.timestamp().max(0.0);
                if window.is_past(local) || local >= span {
                    sample.close();
                    break;
                }
                let duration = sample.duration().max(0.0);
                let out = conformed(&sample, sink, cursor + local, duration);
                sample.close();
                let accepted = match out {
                    Ok(out) => self.append_audio(output, sink, out, local + duration, &mut state, &label).await?,
                    Err(err) => {
                        state.fail(&label, &err);
                        false
                    }
                };
                if !accepted {
                    break;
                }
            },
            Err(err) => state.fail(&label, &err),
        }

        self.pad_silence(output, sink, cursor, span, &mut state, &label).await?;
        Ok(state.outcome(AudioOutcome::Source))
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_blend(
        &self,
        output: &mut OutputHandle,
        sink: AudioSink,
        clip: &mut NormalizedClip<'_>,
        other: &PcmBuffer,
        gain_clip: f32,
        gain_other: f32,
        cursor: f64,
        span: f64,
    ) -> SpliceResult<AudioOutcome> {
        let params = sink.config.params;
        let mut state = ClipAudio::new(clip.audio_failure.clone());
        let source = clip.audio_source();
        let label = source.label().to_string();
        let own = match source.audio_track() {
            Some(track) if track.sample_rate != params.sample_rate => {
                let err = SpliceError::incompatible_format(format!(
                    "Clip audio is {} Hz but the output is {} Hz",
                    track.sample_rate, params.sample_rate
                ));
                state.fail(&label, &err);
                None
            }
            Some(track) => match decode_track(source, &track).await {
                Ok(buffer) => Some(buffer),
                Err(err) => {
                    state.fail(&label, &err);
                    None
                }
            },
            None => None,
        };
        self.cancel.check()?;
        let own = own.unwrap_or_else(|| PcmBuffer::silence(params.sample_rate, params.channels, span));

        // Both inputs are at the output rate.
        let mixed = mix(
            &match_duration(own.with_channel_count(params.channels), span),
            &match_duration(other.with_channel_count(params.channels), span),
            gain_clip,
            gain_other,
        )?;
        self.write_buffer(output, sink, &mixed, cursor, &mut state, &label).await?;
        self.pad_silence(output, sink, cursor, span, &mut state, &label).await?;
        Ok(state.outcome(AudioOutcome::Blended))
    }

    /// Append one sample ending at clip-local `local_end`. A rejected sample
    /// is recorded in `state` and yields `false`.
    async fn append_audio(
        &self,
        output: &mut OutputHandle,
        sink: AudioSink,
        sample: Sample,
        local_end: f64,
        state: &mut ClipAudio,
        label: &str,
    ) -> SpliceResult<bool> {
        self.cancel.check()?;
        match output.append(sink.track, sample).await {
            Ok(()) => {
                state.end = state.end.max(local_end);
                Ok(true)
            }
            Err(err) => {
                state.fail(label, &err);
                Ok(false)
            }
        }
    }

    /// Append `buffer` from clip-local `state.end`.
    async fn write_buffer(
        &self,
        output: &mut OutputHandle,
        sink: AudioSink,
        buffer: &PcmBuffer,
        cursor: f64,
        state: &mut ClipAudio,
        label: &str,
    ) -> SpliceResult<()> {
        let from = state.end;
        for sample in buffer.to_samples(cursor + from, self.settings.pcm_chunk_frames) {
            let local_end = sample.timestamp() + sample.duration() - cursor;
            if !self.append_audio(output, sink, sample, local_end, state, label).await? {
                break;
            }
        }
        Ok(())
    }

    /// Silence from clip-local `state.end` to `span`.
    async fn pad_silence(
        &self,
        output: &mut OutputHandle,
        sink: AudioSink,
        cursor: f64,
        span: f64,
        state: &mut ClipAudio,
        label: &str,
    ) -> SpliceResult<()> {
        let gap = span - state.end;
        if gap <= 1e-6 {
            return Ok(());
        }
        let params = sink.config.params;
        let silence = PcmBuffer::silence(params.sample_rate, params.channels, gap);
        tracing::debug!(start = cursor + state.end, secs = gap, "Writing silence");
        self.write_buffer(output, sink, &silence, cursor, state, label).await
    }
}

/// `sample` moved to `timestamp`, with decoded PCM fitted to the sink.
fn conformed(sample: &Sample, sink: AudioSink, timestamp: f64, duration: f64) -> SpliceResult<Sample> {
    let params = sink.config.params;
    match sample.payload() {
        Payload::Audio(chunk) => Ok(Sample::new(
            timestamp,
            duration,
            Payload::Audio(conform_chunk(chunk, params.sample_rate, params.channels)?),
        )),
        _ => Ok(sample.retimed(timestamp, duration)),
    }
}
