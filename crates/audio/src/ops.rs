//! Duration matching and two-input mixing.

use splice_common::error::{SpliceError, SpliceResult};
use splice_media_engine::sample::PcmChunk;

use crate::buffer::{frames_for, PcmBuffer};

/// Pad or truncate `buffer` to `target_secs`.
///
/// `target_len = round(rate × target_secs)`. When the buffer already has
/// that length it is returned untouched; otherwise the first
/// `min(len, target_len)` frames are kept and the rest is zero-filled.
/// Never resamples. The channel count is preserved.
pub fn match_duration(buffer: PcmBuffer, target_secs: f64) -> PcmBuffer {
    let target_len = frames_for(buffer.sample_rate(), target_secs);
    if buffer.len() == target_len {
        return buffer;
    }
    tracing::trace!(
        from = buffer.len(),
        to = target_len,
        sample_rate = buffer.sample_rate(),
        "Matching buffer duration"
    );
    let mut out = buffer.slice(0, target_len);
    for channel in out.channels_mut() {
        channel.resize(target_len, 0.0);
    }
    out
}

/// Fit one decoded chunk to a track of `sample_rate` Hz and `channels`
/// channels.
///
/// Channels are adapted as in [`PcmBuffer::with_channel_count`]. A differing
/// sample rate fails with `IncompatibleFormat`.
pub fn conform_chunk(chunk: &PcmChunk, sample_rate: u32, channels: u16) -> SpliceResult<PcmChunk> {
    if chunk.sample_rate() != sample_rate {
        return Err(SpliceError::incompatible_format(format!(
            "{} Hz audio cannot go into a {} Hz track",
            chunk.sample_rate(),
            sample_rate
        )));
    }
    if chunk.channels() == channels.max(1) {
        return Ok(chunk.clone());
    }
    let adapted = PcmBuffer::new(sample_rate, chunk.planes().to_vec())?.with_channel_count(channels);
    PcmChunk::new(sample_rate, adapted.channels().to_vec())
}

/// Mix `a × gain_a + b × gain_b`.
///
/// The result has `max` of the channel counts and `min` of the lengths; a
/// channel missing from one input contributes zero. If any sample exceeds
/// 1.0 in magnitude, the whole result is scaled once by `1 / peak`.
pub fn mix(a: &PcmBuffer, b: &PcmBuffer, gain_a: f32, gain_b: f32) -> SpliceResult<PcmBuffer> {
    if a.sample_rate() != b.sample_rate() {
        return Err(SpliceError::incompatible_format(format!(
            "Cannot mix {} Hz with {} Hz audio",
            a.sample_rate(),
            b.sample_rate()
        )));
    }
    let channels = a.channel_count().max(b.channel_count()) as usize;
    let len = a.len().min(b.len());

    let mut out: Vec<Vec<f32>> = (0..channels)
        .map(|ch| {
            let ca = a.channel(ch);
            let cb = b.channel(ch);
            (0..len)
                .map(|i| {
                    let sa = ca.map_or(0.0, |c| c[i]);
                    let sb = cb.map_or(0.0, |c| c[i]);
                    sa * gain_a + sb * gain_b
                })
                .collect()
        })
        .collect();

    let peak = out
        .iter()
        .flatten()
        .fold(0.0f32, |peak, s| peak.max(s.abs()));
    if peak > 1.0 {
        tracing::debug!(peak, "Normalizing mixed audio");
        let scale = 1.0 / peak;
        for s in out.iter_mut().flatten() {
            *s *= scale;
        }
    }

    PcmBuffer::new(a.sample_rate(), out)
}
