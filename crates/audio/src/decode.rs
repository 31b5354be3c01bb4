//! Whole-track audio decode.

use splice_common::error::{SpliceError, SpliceResult, TrackKind};
use splice_media_engine::engine::{AudioTrackRef, MediaEngine, SampleMode};
use splice_media_engine::guard::SourceHandle;

use crate::buffer::PcmBuffer;

/// Decode the first audio track of a container held in `bytes`.
///
/// The source opened for this is disposed on every path.
pub async fn decode(engine: &dyn MediaEngine, bytes: Vec<u8>) -> SpliceResult<PcmBuffer> {
    let mut source = SourceHandle::open(engine, "audio-decode", bytes).await?;
    let track = source
        .audio_track()
        .ok_or_else(|| SpliceError::unsupported_input("Container has no audio track"))?;
    let buffer = decode_track(&mut source, &track).await;
    source.dispose();
    buffer
}

/// Decode one audio track of an already opened source.
pub async fn decode_track(source: &mut SourceHandle, track: &AudioTrackRef) -> SpliceResult<PcmBuffer> {
    tracing::debug!(
        source = source.label(),
        codec = %track.codec,
        sample_rate = track.sample_rate,
        channels = track.channels,
        "Decoding audio track"
    );
    let mut stream = source.samples(track.id, SampleMode::Decoded).await?;
    let mut buffer: Option<PcmBuffer> = None;
    while let Some(sample) = stream.next_sample().await? {
        let Some(chunk) = sample.pcm() else {
            return Err(SpliceError::decode(
                TrackKind::Audio,
                "decoder delivered a non-PCM sample",
            ));
        };
        match buffer.as_mut() {
            Some(buf) => buf.push_chunk(chunk)?,
            None => buffer = PcmBuffer::from_chunks([chunk])?,
        }
        sample.close();
    }
    Ok(buffer.unwrap_or_else(|| PcmBuffer::silence(track.sample_rate, track.channels, 0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_media_engine::codec::{AudioCodec, ContainerKind, VideoCodec};
    use splice_media_engine::memory::{MemoryContainer, MemoryEngine, MemoryTrack};
    use splice_edit_model::dimension::FrameSize;

    #[tokio::test]
    async fn test_decode_concatenates_chunks() {
        let engine = MemoryEngine::new();
        let bytes = engine.insert(MemoryContainer::new(ContainerKind::Mp4).with_audio(
            MemoryTrack::synthetic_audio(AudioCodec::Aac, 8000, 2, 1.5, 1024, 0.3),
        ));
        let buf = decode(&engine, bytes).await.unwrap();
        assert_eq!(buf.len(), 12000);
        assert_eq!(buf.channel_count(), 2);
        let ledger = engine.ledger();
        assert!(ledger.sources_balanced());
        assert!(ledger.samples_balanced());
    }

    #[tokio::test]
    async fn test_decode_without_audio_is_unsupported() {
        let engine = MemoryEngine::new();
        let bytes = engine.insert(MemoryContainer::new(ContainerKind::Mp4).with_video(
            MemoryTrack::synthetic_video(VideoCodec::Avc, FrameSize::new(2, 2), 1.0, 1.0, [0; 4]),
        ));
        let err = decode(&engine, bytes).await.unwrap_err();
        assert!(matches!(err, SpliceError::UnsupportedInput { .. }));
        assert!(engine.ledger().sources_balanced());
    }

    #[tokio::test]
    async fn test_decode_failure_still_disposes_source() {
        let engine = MemoryEngine::new();
        let bytes = engine.insert(MemoryContainer::new(ContainerKind::Mp4).with_audio(
            MemoryTrack::synthetic_audio(AudioCodec::Aac, 8000, 1, 1.0, 1000, 0.1).failing_after(3),
        ));
        let err = decode(&engine, bytes).await.unwrap_err();
        assert!(matches!(err, SpliceError::DecodeFailure { track: TrackKind::Audio, .. }));
        let ledger = engine.ledger();
        assert!(ledger.sources_balanced());
        assert!(ledger.samples_balanced());
    }

    #[tokio::test]
    async fn test_unopenable_bytes() {
        let engine = MemoryEngine::new();
        let err = decode(&engine, vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, SpliceError::UnsupportedInput { .. }));
    }
}
