use std::sync::{Arc, Mutex};

use splice_audio::PcmBuffer;
use splice_common::error::{SpliceError, TrackKind};
use splice_compose::{
    AudioEdit, AudioOutcome, Assembler, CancellationToken, ClipEdit, ClipInput, Crop, Grayscale,
    OutputSettings, Progress, ProgressStage,
};
use splice_edit_model::dimension::FrameSize;
use splice_edit_model::rect::NormalizedRect;
use splice_edit_model::time_range::TimeRange;
use splice_media_engine::codec::{AudioCodec, ContainerKind, VideoCodec};
use splice_media_engine::memory::{MemoryContainer, MemoryEngine, MemoryTrack, StoredSample};

const SMALL: FrameSize = FrameSize::new(32, 18);

fn video(size: FrameSize, fps: f64, secs: f64) -> MemoryTrack {
    MemoryTrack::synthetic_video(VideoCodec::Avc, size, fps, secs, [50, 100, 150, 255])
}

fn audio(secs: f64) -> MemoryTrack {
    MemoryTrack::synthetic_audio(AudioCodec::Aac, 8000, 2, secs, 800, 0.25)
}

fn clip_with_audio(engine: &MemoryEngine, label: &str, size: FrameSize, secs: f64) -> ClipInput {
    let bytes = engine.insert(
        MemoryContainer::new(ContainerKind::Mp4)
            .with_video(video(size, 10.0, secs))
            .with_audio(audio(secs)),
    );
    ClipInput::new(label, bytes)
}

fn silent_clip(engine: &MemoryEngine, label: &str, size: FrameSize, secs: f64) -> ClipInput {
    let bytes = engine.insert(MemoryContainer::new(ContainerKind::Mp4).with_video(video(size, 10.0, secs)));
    ClipInput::new(label, bytes)
}

fn last_end(samples: &[StoredSample]) -> f64 {
    samples.last().map(StoredSample::end).unwrap_or(0.0)
}

fn assert_monotonic(samples: &[StoredSample]) {
    for pair in samples.windows(2) {
        assert!(
            pair[1].timestamp + 1e-9 >= pair[0].timestamp,
            "timestamps went backwards: {} then {}",
            pair[0].timestamp,
            pair[1].timestamp
        );
    }
}

fn assert_resources_released(engine: &MemoryEngine) {
    let ledger = engine.ledger();
    assert!(ledger.sources_balanced(), "sources leaked: {ledger:?}");
    assert!(ledger.samples_balanced(), "samples leaked: {ledger:?}");
    assert!(ledger.outputs_settled(), "outputs left open: {ledger:?}");
}

#[tokio::test]
async fn two_hd_clips_then_vga_clip_is_rescaled() {
    let engine = MemoryEngine::new();
    let hd = FrameSize::new(1280, 720);
    let clips = vec![
        clip_with_audio(&engine, "a", hd, 5.0),
        clip_with_audio(&engine, "b", hd, 5.0),
        silent_clip(&engine, "c", FrameSize::new(640, 480), 1.0),
    ];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert_eq!(report.frame_size, hd);
    assert!((report.duration_secs - 11.0).abs() < 1e-6);
    assert!(report.clips[0].path.is_direct());
    assert!(report.clips[1].path.is_direct());
    assert!(!report.clips[2].path.is_direct());
    assert_eq!(report.clips[2].audio, AudioOutcome::Silence);

    let out = engine.container(&report.bytes).unwrap();
    let video = out.video.as_ref().unwrap();
    assert_eq!(video.samples.len(), 110);
    assert!(video.samples.iter().all(|s| s.frame().unwrap().size() == hd));
    assert!((video.samples[50].timestamp - 5.0).abs() < 1e-9);
    assert_monotonic(&video.samples);
    assert_resources_released(&engine);
    // Three inputs and the output; the rescaled clip's temp container is gone.
    assert_eq!(engine.stored(), 4);
}

#[tokio::test]
async fn final_timestamp_matches_sum_of_durations() {
    let engine = MemoryEngine::new();
    let durations = [1.0, 2.5, 0.7];
    let clips = durations
        .iter()
        .enumerate()
        .map(|(i, d)| clip_with_audio(&engine, &format!("clip{i}"), SMALL, *d))
        .collect();

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    let total: f64 = durations.iter().sum();
    let out = engine.container(&report.bytes).unwrap();
    let video = out.video.as_ref().unwrap();
    let last = video.samples.last().unwrap();
    assert!((last.end() - total).abs() < 0.1 + 1e-9);
    assert!((report.duration_secs - total).abs() < 1e-6);
    assert_monotonic(&video.samples);
    assert_monotonic(&out.audio.as_ref().unwrap().samples);
}

#[tokio::test]
async fn clip_without_audio_gets_silence_for_its_span() {
    let engine = MemoryEngine::new();
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        silent_clip(&engine, "b", SMALL, 2.0),
        clip_with_audio(&engine, "c", SMALL, 1.0),
    ];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();
    assert_eq!(report.clips[1].audio, AudioOutcome::Silence);

    let out = engine.container(&report.bytes).unwrap();
    let audio = out.audio.as_ref().unwrap();
    assert_monotonic(&audio.samples);
    assert!((last_end(&audio.samples) - 4.0).abs() < 1e-6);

    let in_gap: Vec<_> = audio
        .samples
        .iter()
        .filter(|s| s.timestamp > 1.0 - 1e-6 && s.timestamp < 3.0 - 1e-6)
        .collect();
    assert!(!in_gap.is_empty());
    assert!(in_gap
        .iter()
        .all(|s| s.pcm().unwrap().planes().iter().flatten().all(|v| *v == 0.0)));
    let covered: f64 = in_gap.iter().map(|s| s.duration).sum();
    assert!((covered - 2.0).abs() < 1e-3);
}

#[tokio::test]
async fn cancelling_during_second_clip_never_finalizes() {
    let engine = MemoryEngine::new();
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        clip_with_audio(&engine, "b", SMALL, 1.0),
        clip_with_audio(&engine, "c", SMALL, 1.0),
    ];
    let token = CancellationToken::new();
    let trigger = token.clone();

    let err = Assembler::new(&engine, OutputSettings::default())
        .with_cancellation(token)
        .with_progress(Box::new(move |p: Progress| {
            if p.clip_index == 1 && p.stage == ProgressStage::Writing {
                trigger.cancel();
            }
        }))
        .compose(clips)
        .await
        .unwrap_err();

    assert!(matches!(err, SpliceError::Cancelled));
    let ledger = engine.ledger();
    assert_eq!(ledger.outputs_finalized, 0);
    assert_eq!(ledger.outputs_cancelled, 1);
    assert_eq!(ledger.sources_opened, 3);
    assert_eq!(ledger.sources_disposed, 3);
    assert!(ledger.samples_balanced());
}

#[tokio::test]
async fn audio_failure_falls_back_to_silence() {
    let engine = MemoryEngine::new();
    let bytes = engine.insert(
        MemoryContainer::new(ContainerKind::Mp4)
            .with_video(video(SMALL, 10.0, 2.0))
            .with_audio(audio(2.0).failing_after(5)),
    );
    let clips = vec![ClipInput::new("flaky", bytes), clip_with_audio(&engine, "ok", SMALL, 1.0)];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert!(matches!(report.clips[0].audio, AudioOutcome::Fallback { .. }));
    assert_eq!(report.clips[1].audio, AudioOutcome::Source);

    let out = engine.container(&report.bytes).unwrap();
    assert_eq!(out.video.as_ref().unwrap().samples.len(), 30);
    let audio = out.audio.as_ref().unwrap();
    assert_monotonic(&audio.samples);
    assert!((last_end(&audio.samples) - 3.0).abs() < 1e-6);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn video_failure_aborts_and_cancels_output() {
    let engine = MemoryEngine::new();
    let broken = engine.insert(
        MemoryContainer::new(ContainerKind::Mp4).with_video(video(SMALL, 10.0, 2.0).failing_after(4)),
    );
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        ClipInput::new("broken", broken),
        clip_with_audio(&engine, "c", SMALL, 1.0),
    ];

    let err = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SpliceError::DecodeFailure {
            track: TrackKind::Video,
            ..
        }
    ));
    let ledger = engine.ledger();
    assert_eq!(ledger.outputs_finalized, 0);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn progress_is_monotonic_and_completes_after_finalize() {
    let engine = MemoryEngine::new();
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        clip_with_audio(&engine, "b", FrameSize::new(16, 10), 1.0),
    ];
    let seen = Arc::new(Mutex::new(Vec::<Progress>::new()));
    let sink = seen.clone();

    Assembler::new(&engine, OutputSettings::default())
        .with_progress(Box::new(move |p| sink.lock().unwrap().push(p)))
        .compose(clips)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.len() > 4);
    for pair in seen.windows(2) {
        assert!(pair[1].percent >= pair[0].percent);
    }
    let (last, before) = seen.split_last().unwrap();
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.stage, ProgressStage::Complete);
    assert!(before.iter().all(|p| p.percent <= 90.0));
    assert_eq!(before.last().unwrap().stage, ProgressStage::Finalizing);
}

#[tokio::test]
async fn speed_trim_and_transform_go_through_reencode() {
    let engine = MemoryEngine::new();
    let edited = clip_with_audio(&engine, "fast", SMALL, 4.0).with_edit(
        ClipEdit::default()
            .with_trim(TimeRange::new(1.0, Some(3.0)).unwrap())
            .with_speed(2.0)
            .with_transform(Grayscale),
    );
    let clips = vec![edited, clip_with_audio(&engine, "plain", SMALL, 1.0)];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert!(!report.clips[0].path.is_direct());
    assert!((report.clips[0].span_secs - 1.0).abs() < 1e-9);
    assert!((report.duration_secs - 2.0).abs() < 1e-9);

    let out = engine.container(&report.bytes).unwrap();
    let video = out.video.as_ref().unwrap();
    let first = video.samples[0].frame().unwrap().pixel(0, 0).unwrap();
    assert_eq!(first[0], first[1]);
    assert_eq!(first[1], first[2]);
    assert_eq!(video.samples.len(), 30);
    assert!((video.samples[20].timestamp - 1.0).abs() < 1e-9);
    assert_monotonic(&out.audio.as_ref().unwrap().samples);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn replaced_and_muted_audio() {
    let engine = MemoryEngine::new();
    let music = PcmBuffer::new(8000, vec![vec![0.5; 4000], vec![0.5; 4000]]).unwrap();
    let clips = vec![
        clip_with_audio(&engine, "replaced", SMALL, 1.0)
            .with_edit(ClipEdit::default().with_audio(AudioEdit::Replace(music))),
        clip_with_audio(&engine, "muted", SMALL, 1.0).with_edit(ClipEdit::default().with_audio(AudioEdit::Mute)),
    ];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();
    assert_eq!(report.clips[0].audio, AudioOutcome::Replaced);
    assert_eq!(report.clips[1].audio, AudioOutcome::Muted);

    let out = engine.container(&report.bytes).unwrap();
    let audio = out.audio.as_ref().unwrap();
    let level_at = |t: f64| {
        audio
            .samples
            .iter()
            .find(|s| s.timestamp <= t && t < s.end())
            .and_then(|s| s.pcm().and_then(|p| p.plane(0)).map(|p| p[0]))
    };
    assert_eq!(level_at(0.1), Some(0.5));
    assert_eq!(level_at(0.75), Some(0.0));
    assert_eq!(level_at(1.5), Some(0.0));
    assert!((last_end(&audio.samples) - 2.0).abs() < 1e-6);
}

#[tokio::test]
async fn blend_mixes_clip_audio_with_buffer() {
    let engine = MemoryEngine::new();
    let bed = PcmBuffer::new(8000, vec![vec![0.5; 8000]]).unwrap();
    let clips = vec![clip_with_audio(&engine, "voice", SMALL, 1.0).with_edit(ClipEdit::default().with_audio(
        AudioEdit::Blend {
            other: bed,
            gain_clip: 1.0,
            gain_other: 1.0,
        },
    ))];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();
    assert_eq!(report.clips[0].audio, AudioOutcome::Blended);

    let out = engine.container(&report.bytes).unwrap();
    let first = out.audio.as_ref().unwrap().samples[0].pcm().unwrap().plane(1).unwrap()[0];
    assert!((first - 0.75).abs() < 1e-6);
}

#[tokio::test]
async fn codec_falls_back_when_preferred_is_not_encodable() {
    let engine = MemoryEngine::with_encoders(&[VideoCodec::Vp9], &[AudioCodec::Opus]);
    let clips = vec![clip_with_audio(&engine, "a", SMALL, 1.0)];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert_eq!(report.video_codec, VideoCodec::Vp9);
    assert_eq!(report.audio_codec, Some(AudioCodec::Opus));
    assert!(!report.clips[0].path.is_direct());
    assert_resources_released(&engine);
}

#[tokio::test]
async fn no_encodable_codec_fails_before_writing() {
    let engine = MemoryEngine::with_encoders(&[VideoCodec::Hevc], &[]);
    let clips = vec![clip_with_audio(&engine, "a", SMALL, 1.0)];

    let err = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap_err();

    assert!(matches!(err, SpliceError::EncodeCapabilityMissing { .. }));
    let ledger = engine.ledger();
    assert_eq!(ledger.outputs_created, 0);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn unopenable_clip_disposes_earlier_sources() {
    let engine = MemoryEngine::new();
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        ClipInput::new("garbage", b"not a container".to_vec()),
    ];

    let err = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap_err();

    assert!(matches!(err, SpliceError::UnsupportedInput { .. }));
    assert_eq!(engine.ledger().sources_disposed, 1);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn odd_first_frame_is_rounded_down_to_even() {
    let engine = MemoryEngine::new();
    let clips = vec![silent_clip(&engine, "odd", FrameSize::new(33, 19), 0.5)];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert_eq!(report.frame_size, FrameSize::new(32, 18));
    assert_eq!(report.audio_codec, None);
    assert!(engine.container(&report.bytes).unwrap().audio.is_none());
}

#[tokio::test]
async fn rejected_audio_packet_falls_back_without_aborting() {
    let engine = MemoryEngine::new();
    let mut shuffled = audio(1.0);
    shuffled.samples.swap(2, 3);
    let bytes = engine.insert(
        MemoryContainer::new(ContainerKind::Mp4)
            .with_video(video(SMALL, 10.0, 1.0))
            .with_audio(shuffled),
    );
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        ClipInput::new("shuffled", bytes),
        clip_with_audio(&engine, "c", SMALL, 1.0),
    ];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert_eq!(report.clips[0].audio, AudioOutcome::Source);
    let AudioOutcome::Fallback { error } = &report.clips[1].audio else {
        panic!("expected fallback, got {:?}", report.clips[1].audio);
    };
    assert!(error.contains("Non-monotonic"));
    assert_eq!(report.clips[2].audio, AudioOutcome::Source);

    let out = engine.container(&report.bytes).unwrap();
    let audio = out.audio.as_ref().unwrap();
    assert_monotonic(&audio.samples);
    assert!((last_end(&audio.samples) - 3.0).abs() < 1e-6);
    assert_eq!(engine.ledger().outputs_finalized, 1);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn clip_audio_is_fitted_to_the_output_format() {
    let engine = MemoryEngine::new();
    let with_audio = |label: &str, rate: u32, channels: u16| {
        let bytes = engine.insert(
            MemoryContainer::new(ContainerKind::Mp4)
                .with_video(video(SMALL, 10.0, 1.0))
                .with_audio(MemoryTrack::synthetic_audio(AudioCodec::Aac, rate, channels, 1.0, rate as usize / 10, 0.25)),
        );
        ClipInput::new(label, bytes)
    };
    let clips = vec![
        with_audio("mono", 8000, 1),
        with_audio("fast", 16000, 2),
        with_audio("stereo", 8000, 2),
    ];

    let report = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap();

    assert_eq!(report.clips[0].audio, AudioOutcome::Source);
    assert!(matches!(report.clips[1].audio, AudioOutcome::Fallback { .. }));
    assert_eq!(report.clips[2].audio, AudioOutcome::Source);

    let out = engine.container(&report.bytes).unwrap();
    let audio = out.audio.as_ref().unwrap();
    assert!(audio.samples.iter().all(|s| {
        let pcm = s.pcm().unwrap();
        pcm.sample_rate() == 8000 && pcm.channels() == 1
    }));
    let level_at = |t: f64| {
        audio
            .samples
            .iter()
            .find(|s| s.timestamp <= t && t < s.end())
            .and_then(|s| s.pcm().and_then(|p| p.plane(0)).map(|p| p[0]))
    };
    assert_eq!(level_at(0.5), Some(0.25));
    assert_eq!(level_at(1.5), Some(0.0));
    assert_eq!(level_at(2.5), Some(0.25));
    assert!((last_end(&audio.samples) - 3.0).abs() < 1e-6);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn blend_bed_at_another_rate_fails_before_output_is_created() {
    let engine = MemoryEngine::new();
    let bed = PcmBuffer::new(44100, vec![vec![0.5; 44100]]).unwrap();
    let clips = vec![
        clip_with_audio(&engine, "a", SMALL, 1.0),
        clip_with_audio(&engine, "voice", SMALL, 1.0).with_edit(ClipEdit::default().with_audio(
            AudioEdit::Blend {
                other: bed,
                gain_clip: 1.0,
                gain_other: 1.0,
            },
        )),
    ];

    let err = Assembler::new(&engine, OutputSettings::default())
        .compose(clips)
        .await
        .unwrap_err();

    assert!(matches!(err, SpliceError::IncompatibleFormat { .. }));
    assert_eq!(engine.ledger().outputs_created, 0);
    assert_resources_released(&engine);
}

#[tokio::test]
async fn too_small_crop_on_later_clip_fails_before_output_is_created() {
    let engine = MemoryEngine::new();
    let wide = FrameSize::new(640, 360);
    // 0.02 of 640 px is 12 px: a valid even region, but under the 20 px minimum.
    let crop = Crop::new(NormalizedRect::new(0.0, 0.0, 0.02, 0.5));
    let clips = || {
        vec![
            silent_clip(&engine, "a", SMALL, 0.5),
            silent_clip(&engine, "b", wide, 0.5).with_edit(ClipEdit::default().with_transform(crop)),
        ]
    };

    let err = Assembler::new(&engine, OutputSettings::default())
        .compose(clips())
        .await
        .unwrap_err();
    assert!(matches!(err, SpliceError::TooSmallRegion { .. }));
    assert_eq!(engine.ledger().outputs_created, 0);
    assert_resources_released(&engine);

    let mut settings = OutputSettings::default();
    settings.min_region_px = 2;
    let report = Assembler::new(&engine, settings).compose(clips()).await.unwrap();
    assert!(!report.clips[1].path.is_direct());
    assert_resources_released(&engine);
}
