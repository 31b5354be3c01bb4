//! Report encoder availability.

use splice_edit_model::dimension::FrameSize;
use splice_edit_model::quality::Quality;
use splice_media_engine::{
    AudioCodec, AudioEncodeParams, ContainerKind, MediaEngine, MemoryEngine, VideoCodec,
    VideoEncodeParams,
};

pub async fn run(width: u32, height: u32) -> anyhow::Result<()> {
    let engine = MemoryEngine::new();
    let size = FrameSize::new(width, height);
    let video_params = VideoEncodeParams {
        size,
        frame_rate: 30.0,
        bitrate: Quality::default().video_bitrate(size, 30.0),
    };
    let audio_params = AudioEncodeParams {
        sample_rate: 48000,
        channels: 2,
        bitrate: Quality::default().audio_bitrate(2),
    };

    println!("Splice Encoder Check ({})", engine.name());
    println!("{}", "=".repeat(50));
    if !size.is_encodable() {
        println!("[WARN] {size} has odd or zero dimensions; video encoders will refuse it");
    }

    for container in ContainerKind::ALL {
        println!();
        println!("{container}:");
        for codec in VideoCodec::ALL.iter().filter(|c| container.supports_video(**c)) {
            let ok = engine.can_encode_video(*codec, &video_params).await;
            println!("  [{}] video {codec} @ {size}", if ok { "OK" } else { "--" });
        }
        for codec in AudioCodec::ALL.iter().filter(|c| container.supports_audio(**c)) {
            let ok = engine.can_encode_audio(*codec, &audio_params).await;
            println!("  [{}] audio {codec}", if ok { "OK" } else { "--" });
        }
    }

    Ok(())
}
