//! Job settings and JSON job descriptions.
//!
//! [`OutputSettings`] is the resolved, typed form of the `output` section of
//! [`SpliceConfig`]. [`JobSpec`] describes a composition of synthetic clips;
//! the CLI plans it offline or runs it through the in-process engine.

use serde::{Deserialize, Serialize};
use splice_common::config::SpliceConfig;
use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::dimension::FrameSize;
use splice_edit_model::quality::Quality;
use splice_edit_model::rect::{NormalizedRect, MIN_PIXEL_SIZE};
use splice_edit_model::time_range::TimeRange;
use splice_media_engine::codec::{parse_codec_list, AudioCodec, ContainerKind, VideoCodec};
use splice_media_engine::memory::{MemoryContainer, MemoryEngine, MemoryTrack};

use crate::clip::{AudioEdit, ClipEdit, ClipInput};
use crate::normalizer::{plan_path, resolve_target_size, NormalizePath};
use crate::transform::{check_region, Chain, Crop, Grayscale};

/// Output parameters for one job, resolved once before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub container: ContainerKind,
    pub video_codecs: Vec<VideoCodec>,
    pub audio_codecs: Vec<AudioCodec>,
    pub quality: Quality,
    pub fallback_fps: f64,
    pub fallback_sample_rate: u32,
    pub fallback_channels: u16,
    pub pcm_chunk_frames: usize,
    /// Smallest crop edge, in source pixels.
    pub min_region_px: u32,
    pub work_ceiling_percent: f64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            container: ContainerKind::Mp4,
            video_codecs: vec![VideoCodec::Avc, VideoCodec::Vp9, VideoCodec::Av1],
            audio_codecs: vec![AudioCodec::Aac, AudioCodec::Opus],
            quality: Quality::High,
            fallback_fps: 30.0,
            fallback_sample_rate: 48000,
            fallback_channels: 2,
            pcm_chunk_frames: 1024,
            min_region_px: MIN_PIXEL_SIZE,
            work_ceiling_percent: 90.0,
        }
    }
}

impl OutputSettings {
    pub fn from_config(config: &SpliceConfig) -> SpliceResult<Self> {
        config.validate()?;
        let output = &config.output;
        Ok(Self {
            container: output.container.parse()?,
            video_codecs: parse_codec_list(&output.video_codecs)?,
            audio_codecs: parse_codec_list(&output.audio_codecs)?,
            quality: output.quality.parse()?,
            fallback_fps: output.fallback_fps,
            fallback_sample_rate: output.fallback_sample_rate,
            fallback_channels: output.fallback_channels,
            pcm_chunk_frames: config.normalizer.pcm_chunk_frames,
            min_region_px: config.normalizer.min_region_px,
            work_ceiling_percent: config.progress.work_ceiling_percent,
        })
    }
}

fn default_video_codec() -> VideoCodec {
    VideoCodec::Avc
}

fn default_audio_codec() -> AudioCodec {
    AudioCodec::Aac
}

fn default_fps() -> f64 {
    30.0
}

fn default_speed() -> f64 {
    1.0
}

/// Audio track of a synthetic clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSpec {
    #[serde(default = "default_audio_codec")]
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    /// Make decoding fail after this many samples.
    #[serde(default)]
    pub fail_after: Option<usize>,
}

/// One synthetic clip and its edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    pub label: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_video_codec")]
    pub codec: VideoCodec,
    #[serde(default = "default_fps")]
    pub fps: f64,
    pub duration_secs: f64,
    #[serde(default)]
    pub audio: Option<AudioSpec>,

    #[serde(default)]
    pub trim: Option<TimeRange>,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub grayscale: bool,
    #[serde(default)]
    pub crop: Option<NormalizedRect>,
    #[serde(default)]
    pub resize: Option<(f64, f64)>,
    #[serde(default)]
    pub mute: bool,
}

impl ClipSpec {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Edits described by this clip.
    pub fn edit(&self) -> SpliceResult<ClipEdit> {
        let mut edit = ClipEdit::default().with_speed(self.speed);
        if let Some(trim) = self.trim {
            edit = edit.with_trim(TimeRange::new(trim.start_secs, trim.end_secs)?);
        }
        edit = match (self.crop, self.grayscale) {
            (Some(rect), true) => edit.with_transform(Chain::new().then(Crop::new(rect)).then(Grayscale)),
            (Some(rect), false) => edit.with_transform(Crop::new(rect)),
            (None, true) => edit.with_transform(Grayscale),
            (None, false) => edit,
        };
        if let Some((width, height)) = self.resize {
            edit = edit.with_resize(width, height);
        }
        if self.mute {
            edit = edit.with_audio(AudioEdit::Mute);
        }
        edit.validate()?;
        Ok(edit)
    }

    /// Reject a crop smaller than `min_px` on either edge of this clip.
    pub fn check_crop(&self, min_px: u32) -> SpliceResult<()> {
        let Some(rect) = self.crop else {
            return Ok(());
        };
        check_region(&rect, self.size(), min_px)
    }

    /// Synthetic container for this clip.
    pub fn container(&self, chunk_frames: usize) -> MemoryContainer {
        let video = MemoryTrack::synthetic_video(
            self.codec,
            self.size(),
            self.fps,
            self.duration_secs,
            [96, 128, 160, 255],
        );
        let mut container = MemoryContainer::new(ContainerKind::Mkv).with_video(video);
        if let Some(audio) = &self.audio {
            let mut track = MemoryTrack::synthetic_audio(
                audio.codec,
                audio.sample_rate,
                audio.channels,
                self.duration_secs,
                chunk_frames,
                0.25,
            );
            if let Some(n) = audio.fail_after {
                track = track.failing_after(n);
            }
            container = container.with_audio(track);
        }
        container
    }
}

/// A composition of synthetic clips, as read from a job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    pub clips: Vec<ClipSpec>,
}

/// Offline plan for one clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipPlan {
    pub label: String,
    pub source_size: FrameSize,
    pub path: NormalizePath,
    pub has_audio: bool,
}

/// Offline plan for a job: what would be written, without running it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPlan {
    pub container: ContainerKind,
    pub frame_size: FrameSize,
    pub frame_rate: f64,
    pub video_codec: VideoCodec,
    pub video_bitrate: u32,
    pub quality: Quality,
    pub clips: Vec<ClipPlan>,
}

impl JobSpec {
    pub fn from_json(json: &str) -> SpliceResult<Self> {
        let spec: Self = serde_json::from_str(json)?;
        if spec.clips.is_empty() {
            return Err(SpliceError::config("Job has no clips"));
        }
        Ok(spec)
    }

    /// Two 720p clips with audio followed by a silent 640x480 clip.
    pub fn demo() -> Self {
        let clip = |label: &str, width, height, audio: bool| ClipSpec {
            label: label.to_string(),
            width,
            height,
            codec: VideoCodec::Avc,
            fps: 10.0,
            duration_secs: 5.0,
            audio: audio.then_some(AudioSpec {
                codec: AudioCodec::Aac,
                sample_rate: 48000,
                channels: 2,
                fail_after: None,
            }),
            trim: None,
            speed: 1.0,
            grayscale: false,
            crop: None,
            resize: None,
            mute: false,
        };
        Self {
            container: None,
            quality: None,
            clips: vec![
                clip("intro", 1280, 720, true),
                clip("main", 1280, 720, true),
                clip("outro", 640, 480, false),
            ],
        }
    }

    /// Apply the job's container and quality overrides.
    pub fn settings(&self, base: &OutputSettings) -> SpliceResult<OutputSettings> {
        let mut settings = base.clone();
        if let Some(container) = &self.container {
            settings.container = container.parse()?;
        }
        if let Some(quality) = &self.quality {
            settings.quality = quality.parse()?;
        }
        Ok(settings)
    }

    /// Store every clip in `engine` and return the assembler inputs.
    pub fn materialize(&self, engine: &MemoryEngine, chunk_frames: usize) -> SpliceResult<Vec<ClipInput>> {
        self.clips
            .iter()
            .map(|clip| {
                let bytes = engine.insert(clip.container(chunk_frames));
                Ok(ClipInput::new(clip.label.clone(), bytes).with_edit(clip.edit()?))
            })
            .collect()
    }

    /// Resolve the output format and each clip's path without an engine.
    ///
    /// The first container-compatible codec is assumed to be encodable.
    pub fn plan(&self, settings: &OutputSettings) -> SpliceResult<JobPlan> {
        let first = self
            .clips
            .first()
            .ok_or_else(|| SpliceError::config("Job has no clips"))?;
        let frame_size = resolve_target_size(first.size(), &first.edit()?)?;
        let frame_rate = if first.fps.is_finite() && first.fps > 0.0 {
            first.fps
        } else {
            settings.fallback_fps
        };
        let video_codec = settings
            .video_codecs
            .iter()
            .copied()
            .find(|c| settings.container.supports_video(*c))
            .ok_or_else(|| {
                SpliceError::encode_capability(format!(
                    "no configured video codec fits {}",
                    settings.container
                ))
            })?;

        let clips = self
            .clips
            .iter()
            .map(|clip| {
                clip.check_crop(settings.min_region_px)?;
                let edit = clip.edit()?;
                Ok(ClipPlan {
                    label: clip.label.clone(),
                    source_size: clip.size(),
                    path: plan_path(clip.size(), clip.codec, video_codec, &edit, frame_size),
                    has_audio: clip.audio.is_some() && !clip.mute,
                })
            })
            .collect::<SpliceResult<Vec<_>>>()?;

        Ok(JobPlan {
            container: settings.container,
            frame_size,
            frame_rate,
            video_codec,
            video_bitrate: settings.quality.video_bitrate(frame_size, frame_rate),
            quality: settings.quality,
            clips,
        })
    }
}
