//! Codec and container identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use splice_common::error::SpliceError;

/// Output/input container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Mp4,
    Mov,
    Webm,
    Mkv,
}

/// Video codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Avc,
    Hevc,
    Vp8,
    Vp9,
    Av1,
}

/// Audio codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
    Mp3,
    Vorbis,
    Flac,
    Pcm,
}

/// Codec of an encoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecId {
    Video(VideoCodec),
    Audio(AudioCodec),
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 4] = [
        ContainerKind::Mp4,
        ContainerKind::Mov,
        ContainerKind::Webm,
        ContainerKind::Mkv,
    ];

    /// Whether the container can carry this video codec.
    pub fn supports_video(&self, codec: VideoCodec) -> bool {
        match self {
            ContainerKind::Mp4 | ContainerKind::Mov => {
                matches!(codec, VideoCodec::Avc | VideoCodec::Hevc | VideoCodec::Vp9 | VideoCodec::Av1)
            }
            ContainerKind::Webm => {
                matches!(codec, VideoCodec::Vp8 | VideoCodec::Vp9 | VideoCodec::Av1)
            }
            ContainerKind::Mkv => true,
        }
    }

    /// Whether the container can carry this audio codec.
    pub fn supports_audio(&self, codec: AudioCodec) -> bool {
        match self {
            ContainerKind::Mp4 => !matches!(codec, AudioCodec::Vorbis),
            ContainerKind::Mov => true,
            ContainerKind::Webm => matches!(codec, AudioCodec::Opus | AudioCodec::Vorbis),
            ContainerKind::Mkv => true,
        }
    }

    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerKind::Mp4 => "mp4",
            ContainerKind::Mov => "mov",
            ContainerKind::Webm => "webm",
            ContainerKind::Mkv => "mkv",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerKind {
    type Err = SpliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(ContainerKind::Mp4),
            "mov" => Ok(ContainerKind::Mov),
            "webm" => Ok(ContainerKind::Webm),
            "mkv" | "matroska" => Ok(ContainerKind::Mkv),
            _ => Err(SpliceError::config(format!(
                "Unknown container: {s}. Use: mp4, mov, webm, mkv"
            ))),
        }
    }
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 5] = [
        VideoCodec::Avc,
        VideoCodec::Hevc,
        VideoCodec::Vp8,
        VideoCodec::Vp9,
        VideoCodec::Av1,
    ];
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoCodec::Avc => "avc",
            VideoCodec::Hevc => "hevc",
            VideoCodec::Vp8 => "vp8",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Av1 => "av1",
        };
        f.write_str(name)
    }
}

impl FromStr for VideoCodec {
    type Err = SpliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avc" | "h264" => Ok(VideoCodec::Avc),
            "hevc" | "h265" => Ok(VideoCodec::Hevc),
            "vp8" => Ok(VideoCodec::Vp8),
            "vp9" => Ok(VideoCodec::Vp9),
            "av1" => Ok(VideoCodec::Av1),
            _ => Err(SpliceError::config(format!("Unknown video codec: {s}"))),
        }
    }
}

impl AudioCodec {
    pub const ALL: [AudioCodec; 6] = [
        AudioCodec::Aac,
        AudioCodec::Opus,
        AudioCodec::Mp3,
        AudioCodec::Vorbis,
        AudioCodec::Flac,
        AudioCodec::Pcm,
    ];
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "opus",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
            AudioCodec::Pcm => "pcm",
        };
        f.write_str(name)
    }
}

impl FromStr for AudioCodec {
    type Err = SpliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aac" => Ok(AudioCodec::Aac),
            "opus" => Ok(AudioCodec::Opus),
            "mp3" => Ok(AudioCodec::Mp3),
            "vorbis" => Ok(AudioCodec::Vorbis),
            "flac" => Ok(AudioCodec::Flac),
            "pcm" => Ok(AudioCodec::Pcm),
            _ => Err(SpliceError::config(format!("Unknown audio codec: {s}"))),
        }
    }
}

/// Parse a list of codec names, failing on the first unknown one.
pub fn parse_codec_list<C: FromStr<Err = SpliceError>>(names: &[String]) -> Result<Vec<C>, SpliceError> {
    names.iter().map(|name| name.parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webm_rejects_avc() {
        assert!(!ContainerKind::Webm.supports_video(VideoCodec::Avc));
        assert!(ContainerKind::Webm.supports_video(VideoCodec::Vp9));
        assert!(!ContainerKind::Webm.supports_audio(AudioCodec::Aac));
    }

    #[test]
    fn test_codec_aliases() {
        assert_eq!("H264".parse::<VideoCodec>().unwrap(), VideoCodec::Avc);
        assert_eq!("matroska".parse::<ContainerKind>().unwrap(), ContainerKind::Mkv);
    }

    #[test]
    fn test_parse_codec_list_stops_on_unknown() {
        let names = vec!["avc".to_string(), "theora".to_string()];
        assert!(parse_codec_list::<VideoCodec>(&names).is_err());
    }
}
