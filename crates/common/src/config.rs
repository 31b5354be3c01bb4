//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global composition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpliceConfig {
    /// Default output settings.
    pub output: OutputDefaults,

    /// Track normalization settings.
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Progress reporting settings.
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default output parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDefaults {
    /// Output container (e.g., "mp4", "webm", "mkv").
    pub container: String,

    /// Video codecs in order of preference; the first encodable one wins.
    pub video_codecs: Vec<String>,

    /// Audio codecs in order of preference.
    pub audio_codecs: Vec<String>,

    /// Quality preset ("very-low" .. "very-high", or "custom:<bps>").
    pub quality: String,

    /// Output frame rate used when the source does not report one.
    pub fallback_fps: f64,

    /// Sample rate used for generated silence when no clip carries audio metadata.
    pub fallback_sample_rate: u32,

    /// Channel count used for generated silence when no clip carries audio metadata.
    pub fallback_channels: u16,
}

/// Track normalizer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Minimum edge length (pixels) of an interactive crop/watermark region.
    pub min_region_px: u32,

    /// Frames per generated PCM chunk (silence, replaced or blended audio).
    pub pcm_chunk_frames: usize,
}

/// Progress reporting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Highest percentage reported before the output is finalized.
    pub work_ceiling_percent: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "splice_compose=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            output: OutputDefaults::default(),
            normalizer: NormalizerConfig::default(),
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OutputDefaults {
    fn default() -> Self {
        Self {
            container: "mp4".to_string(),
            video_codecs: vec!["avc".to_string(), "vp9".to_string(), "av1".to_string()],
            audio_codecs: vec!["aac".to_string(), "opus".to_string()],
            quality: "high".to_string(),
            fallback_fps: 30.0,
            fallback_sample_rate: 48000,
            fallback_channels: 2,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_region_px: 20,
            pcm_chunk_frames: 1024,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            work_ceiling_percent: 90.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl SpliceConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> crate::error::SpliceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject values the composition engine cannot work with.
    pub fn validate(&self) -> crate::error::SpliceResult<()> {
        use crate::error::SpliceError;

        if self.output.video_codecs.is_empty() {
            return Err(SpliceError::config("output.video_codecs must not be empty"));
        }
        if self.output.fallback_sample_rate == 0 || self.output.fallback_channels == 0 {
            return Err(SpliceError::config(
                "fallback audio format needs a non-zero sample rate and channel count",
            ));
        }
        if !(self.output.fallback_fps > 0.0) {
            return Err(SpliceError::config("output.fallback_fps must be positive"));
        }
        if self.normalizer.pcm_chunk_frames == 0 {
            return Err(SpliceError::config("normalizer.pcm_chunk_frames must be positive"));
        }
        let ceiling = self.progress.work_ceiling_percent;
        if !(0.0..100.0).contains(&ceiling) {
            return Err(SpliceError::config(
                "progress.work_ceiling_percent must be in [0, 100)",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("splice").join("config.json")
}
