//! Error types shared across Splice crates.

use std::fmt;
use std::path::PathBuf;

/// Kind of track an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Top-level error type for Splice operations.
#[derive(Debug, thiserror::Error)]
pub enum SpliceError {
    /// The container or codec cannot be opened, or there is no usable video track.
    #[error("Unsupported input: {message}")]
    UnsupportedInput { message: String },

    /// Samples of a specific track cannot be decoded.
    #[error("Failed to decode {track} track: {message}")]
    DecodeFailure { track: TrackKind, message: String },

    /// Mixing or matching was given mismatched formats.
    #[error("Incompatible format: {message}")]
    IncompatibleFormat { message: String },

    /// A crop/resize/watermark target resolves below the minimum encodable size.
    #[error("Region too small to encode: {width}x{height}")]
    TooSmallRegion { width: u32, height: u32 },

    /// None of the candidate codecs can be encoded by the engine.
    #[error("No encodable codec available: {message}")]
    EncodeCapabilityMissing { message: String },

    /// The job was stopped through its cancellation token.
    #[error("Job cancelled")]
    Cancelled,

    #[error("Encode error: {message}")]
    Encode { message: String },

    /// The output was finalized without a single sample written.
    #[error("Output finalized without any data")]
    NoDataProduced,

    #[error("Media engine error: {message}")]
    Engine { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SpliceError.
pub type SpliceResult<T> = Result<T, SpliceError>;

impl SpliceError {
    pub fn unsupported_input(msg: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            message: msg.into(),
        }
    }

    pub fn decode(track: TrackKind, msg: impl Into<String>) -> Self {
        Self::DecodeFailure {
            track,
            message: msg.into(),
        }
    }

    pub fn incompatible_format(msg: impl Into<String>) -> Self {
        Self::IncompatibleFormat {
            message: msg.into(),
        }
    }

    pub fn encode_capability(msg: impl Into<String>) -> Self {
        Self::EncodeCapabilityMissing {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
