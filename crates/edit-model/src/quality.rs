//! Output quality presets.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use splice_common::error::SpliceError;

use crate::dimension::FrameSize;

/// Requested output quality, resolved to a concrete bitrate once per job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    VeryLow,
    Low,
    Medium,
    #[default]
    High,
    VeryHigh,
    /// Explicit bitrate in bits per second.
    CustomBitrate(u32),
}

/// Bits per pixel per frame at `Medium`.
const BASE_BITS_PER_PIXEL: f64 = 0.1;

impl Quality {
    fn factor(&self) -> f64 {
        match self {
            Quality::VeryLow => 0.3,
            Quality::Low => 0.6,
            Quality::Medium => 1.0,
            Quality::High => 2.0,
            Quality::VeryHigh => 4.0,
            Quality::CustomBitrate(_) => 1.0,
        }
    }

    /// Video bitrate (bps) for a frame size and rate.
    pub fn video_bitrate(&self, size: FrameSize, fps: f64) -> u32 {
        if let Quality::CustomBitrate(bps) = self {
            return *bps;
        }
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        let bps = size.area() as f64 * fps * BASE_BITS_PER_PIXEL * self.factor();
        bps.round().clamp(100_000.0, u32::MAX as f64) as u32
    }

    /// Audio bitrate (bps) for a channel count.
    pub fn audio_bitrate(&self, channels: u16) -> u32 {
        if let Quality::CustomBitrate(bps) = self {
            // An explicit bitrate targets the video stream; audio gets a fixed share.
            return (*bps / 16).clamp(32_000, 320_000);
        }
        let per_channel = 64_000.0 * self.factor();
        (per_channel * channels.max(1) as f64).round().clamp(32_000.0, 512_000.0) as u32
    }
}

impl FromStr for Quality {
    type Err = SpliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "very-low" | "very_low" => Ok(Quality::VeryLow),
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "very-high" | "very_high" => Ok(Quality::VeryHigh),
            other => {
                let bps = other
                    .strip_prefix("custom:")
                    .and_then(|v| v.parse::<u32>().ok())
                    .filter(|bps| *bps > 0)
                    .ok_or_else(|| {
                        SpliceError::config(format!(
                            "Unknown quality '{s}'. Use: very-low, low, medium, high, very-high, custom:<bps>"
                        ))
                    })?;
                Ok(Quality::CustomBitrate(bps))
            }
        }
    }
}
