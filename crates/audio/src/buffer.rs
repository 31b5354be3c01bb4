//! Planar PCM buffer.

use splice_common::error::{SpliceError, SpliceResult, TrackKind};
use splice_media_engine::sample::{Payload, PcmChunk, Sample};

/// A whole track of decoded audio, one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> SpliceResult<Self> {
        if sample_rate == 0 {
            return Err(SpliceError::incompatible_format("Sample rate must be positive"));
        }
        if channels.is_empty() {
            return Err(SpliceError::incompatible_format("PCM buffer needs at least one channel"));
        }
        let len = channels[0].len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(SpliceError::incompatible_format("PCM channels differ in length"));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// `secs` of zeros.
    pub fn silence(sample_rate: u32, channels: u16, secs: f64) -> Self {
        let sample_rate = sample_rate.max(1);
        let len = frames_for(sample_rate, secs);
        Self {
            sample_rate,
            channels: (0..channels.max(1)).map(|_| vec![0.0; len]).collect(),
        }
    }

    /// Concatenate decoded chunks. All chunks must share rate and channel count.
    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a PcmChunk>) -> SpliceResult<Option<Self>> {
        let mut buffer: Option<PcmBuffer> = None;
        for chunk in chunks {
            let buf = buffer.get_or_insert_with(|| PcmBuffer {
                sample_rate: chunk.sample_rate(),
                channels: vec![Vec::new(); chunk.channels() as usize],
            });
            buf.push_chunk(chunk)?;
        }
        Ok(buffer)
    }

    pub(crate) fn push_chunk(&mut self, chunk: &PcmChunk) -> SpliceResult<()> {
        if chunk.sample_rate() != self.sample_rate {
            return Err(SpliceError::decode(
                TrackKind::Audio,
                format!(
                    "sample rate changed mid-track: {} -> {}",
                    self.sample_rate,
                    chunk.sample_rate()
                ),
            ));
        }
        if chunk.channels() as usize != self.channels.len() {
            return Err(SpliceError::decode(
                TrackKind::Audio,
                format!(
                    "channel count changed mid-track: {} -> {}",
                    self.channels.len(),
                    chunk.channels()
                ),
            ));
        }
        for (dst, src) in self.channels.iter_mut().zip(chunk.planes()) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Copy with exactly `channels` channels. Extra channels are dropped;
    /// missing ones repeat the last channel.
    pub fn with_channel_count(&self, channels: u16) -> PcmBuffer {
        let wanted = channels.max(1) as usize;
        let mut out: Vec<Vec<f32>> = self.channels.iter().take(wanted).cloned().collect();
        while out.len() < wanted {
            let last = out.last().cloned().unwrap_or_default();
            out.push(last);
        }
        PcmBuffer {
            sample_rate: self.sample_rate,
            channels: out,
        }
    }

    /// Frames `[start, start + len)`, clipped to the buffer.
    pub fn slice(&self, start: usize, len: usize) -> PcmBuffer {
        let start = start.min(self.len());
        let end = start.saturating_add(len).min(self.len());
        PcmBuffer {
            sample_rate: self.sample_rate,
            channels: self.channels.iter().map(|c| c[start..end].to_vec()).collect(),
        }
    }

    /// Split into timestamped PCM samples of at most `chunk_frames` frames,
    /// the first starting at `start` seconds.
    pub fn to_samples(&self, start: f64, chunk_frames: usize) -> Vec<Sample> {
        let chunk_frames = chunk_frames.max(1);
        let rate = self.sample_rate as f64;
        let mut samples = Vec::with_capacity(self.len().div_ceil(chunk_frames));
        let mut offset = 0usize;
        while offset < self.len() {
            let frames = chunk_frames.min(self.len() - offset);
            let planes = self
                .channels
                .iter()
                .map(|c| c[offset..offset + frames].to_vec())
                .collect();
            if let Ok(chunk) = PcmChunk::new(self.sample_rate, planes) {
                samples.push(Sample::new(
                    start + offset as f64 / rate,
                    frames as f64 / rate,
                    Payload::Audio(chunk),
                ));
            }
            offset += frames;
        }
        samples
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }
}

/// `round(rate × secs)`, zero for negative or non-finite durations.
pub(crate) fn frames_for(sample_rate: u32, secs: f64) -> usize {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (sample_rate as f64 * secs).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_length_and_channels() {
        let buf = PcmBuffer::silence(48000, 2, 0.5);
        assert_eq!(buf.len(), 24000);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_to_samples_covers_buffer() {
        let buf = PcmBuffer::new(10, vec![(0..25).map(|i| i as f32).collect()]).unwrap();
        let samples = buf.to_samples(2.0, 10);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].timestamp(), 3.0);
        assert_eq!(samples[2].pcm().unwrap().frames(), 5);
        assert!((samples[2].end() - 4.5).abs() < 1e-9);
        assert!(samples.iter().all(|s| !s.is_leased()));
    }

    #[test]
    fn test_from_chunks_rejects_rate_change() {
        let a = PcmChunk::silence(44100, 1, 10);
        let b = PcmChunk::silence(48000, 1, 10);
        assert!(PcmBuffer::from_chunks([&a, &b]).is_err());
        let joined = PcmBuffer::from_chunks([&a, &a]).unwrap().unwrap();
        assert_eq!(joined.len(), 20);
        assert!(PcmBuffer::from_chunks(std::iter::empty()).unwrap().is_none());
    }

    #[test]
    fn test_with_channel_count() {
        let mono = PcmBuffer::new(8000, vec![vec![0.5; 4]]).unwrap();
        let stereo = mono.with_channel_count(2);
        assert_eq!(stereo.channel_count(), 2);
        assert_eq!(stereo.channel(1), Some(&[0.5; 4][..]));
        assert_eq!(stereo.with_channel_count(1), mono);
    }

    #[test]
    fn test_new_rejects_ragged_channels() {
        assert!(PcmBuffer::new(48000, vec![vec![0.0; 2], vec![0.0; 3]]).is_err());
        assert!(PcmBuffer::new(0, vec![vec![0.0; 2]]).is_err());
    }
}
