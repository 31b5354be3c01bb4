//! Trim windows for the cut tool.

use serde::{Deserialize, Serialize};
use splice_common::error::{SpliceError, SpliceResult};

/// A half-open `[start, end)` window in source seconds.
///
/// `end = None` keeps everything after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: Option<f64>,
}

impl TimeRange {
    pub fn new(start_secs: f64, end_secs: Option<f64>) -> SpliceResult<Self> {
        if !start_secs.is_finite() || start_secs < 0.0 {
            return Err(SpliceError::config(format!(
                "Trim start must be a non-negative number, got {start_secs}"
            )));
        }
        if let Some(end) = end_secs {
            if !end.is_finite() || end <= start_secs {
                return Err(SpliceError::config(format!(
                    "Trim end ({end}) must be after start ({start_secs})"
                )));
            }
        }
        Ok(Self {
            start_secs,
            end_secs,
        })
    }

    /// Keep the whole source.
    pub const fn full() -> Self {
        Self {
            start_secs: 0.0,
            end_secs: None,
        }
    }

    /// Whether a sample starting at `timestamp` falls inside the window.
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start_secs && self.end_secs.map_or(true, |end| timestamp < end)
    }

    /// Whether a sample starting at `timestamp` lies past the window.
    pub fn is_past(&self, timestamp: f64) -> bool {
        self.end_secs.map_or(false, |end| timestamp >= end)
    }

    /// Whether this window drops anything from the start of the source.
    pub fn trims_start(&self) -> bool {
        self.start_secs > 0.0
    }

    /// Length of the window, if bounded.
    pub fn duration(&self) -> Option<f64> {
        self.end_secs.map(|end| end - self.start_secs)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_half_open() {
        let range = TimeRange::new(1.0, Some(2.0)).unwrap();
        assert!(!range.contains(0.99));
        assert!(range.contains(1.0));
        assert!(!range.contains(2.0));
        assert!(range.is_past(2.0));
        assert_eq!(range.duration(), Some(1.0));
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(TimeRange::new(2.0, Some(1.0)).is_err());
        assert!(TimeRange::new(-1.0, None).is_err());
    }

    #[test]
    fn test_full_range_keeps_everything() {
        let range = TimeRange::full();
        assert!(range.contains(1e9));
        assert!(!range.trims_start());
    }
}
