//! Audio extraction into an audio-only container.

use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::quality::Quality;
use splice_media_engine::codec::{AudioCodec, ContainerKind};
use splice_media_engine::engine::{select_audio_codec, AudioEncodeParams, AudioTrackConfig, MediaEngine, SampleMode};
use splice_media_engine::guard::{OutputHandle, SourceHandle};

/// Copy the audio track of `bytes` into a new `container`.
///
/// Packets are forwarded when the negotiated codec matches the source
/// codec; otherwise decoded PCM is handed to the encoder. Fails with
/// `UnsupportedInput` when the source has no audio.
pub async fn extract_audio(
    engine: &dyn MediaEngine,
    bytes: Vec<u8>,
    container: ContainerKind,
    codec_candidates: &[AudioCodec],
    quality: Quality,
) -> SpliceResult<Vec<u8>> {
    let mut source = SourceHandle::open(engine, "audio-extract", bytes).await?;
    let track = source
        .audio_track()
        .ok_or_else(|| SpliceError::unsupported_input("Source has no audio track to extract"))?;

    let params = AudioEncodeParams {
        sample_rate: track.sample_rate,
        channels: track.channels,
        bitrate: quality.audio_bitrate(track.channels),
    };
    let codec = select_audio_codec(engine, container, codec_candidates, &params).await?;
    let mode = if codec == track.codec {
        SampleMode::Encoded
    } else {
        SampleMode::Decoded
    };
    tracing::info!(
        source_codec = %track.codec,
        output_codec = %codec,
        %container,
        passthrough = matches!(mode, SampleMode::Encoded),
        "Extracting audio"
    );

    let mut output = OutputHandle::create(engine, container).await?;
    let out_track = output.add_audio_track(AudioTrackConfig { codec, params })?;
    output.start().await?;

    let mut stream = source.samples(track.id, mode).await?;
    while let Some(sample) = stream.next_sample().await? {
        let copy = sample.retimed(sample.timestamp().max(0.0), sample.duration());
        sample.close();
        output.append(out_track, copy).await?;
    }
    drop(stream);
    source.dispose();

    output.finalize().await
}
