//! Encoder dimension policy.
//!
//! Every target width/height handed to an encoder is an even integer of at
//! least [`MIN_ENCODABLE_DIMENSION`] pixels.

use serde::{Deserialize, Serialize};
use splice_common::error::{SpliceError, SpliceResult};

/// Smallest edge length an encoder accepts.
pub const MIN_ENCODABLE_DIMENSION: u32 = 2;

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round a requested (possibly fractional) size to encodable even dimensions.
    ///
    /// Both axes are rounded independently; `1281x721` becomes `1280x720`.
    pub fn even(width: f64, height: f64) -> SpliceResult<Self> {
        match (round_even(width), round_even(height)) {
            (Some(w), Some(h)) => Ok(Self::new(w, h)),
            _ => Err(too_small(width, height)),
        }
    }

    /// Round a requested size to even dimensions, clamped to `bounds`.
    ///
    /// A dimension exceeding the available bounds is clamped down to the
    /// nearest even value that fits. Fails with `TooSmallRegion` if the result
    /// drops below two pixels on either axis.
    pub fn even_within(width: f64, height: f64, bounds: FrameSize) -> SpliceResult<Self> {
        let w = round_even(width).map(|w| clamp_even(w, bounds.width));
        let h = round_even(height).map(|h| clamp_even(h, bounds.height));
        match (w, h) {
            (Some(w), Some(h)) if w >= MIN_ENCODABLE_DIMENSION && h >= MIN_ENCODABLE_DIMENSION => {
                Ok(Self::new(w, h))
            }
            _ => Err(SpliceError::TooSmallRegion {
                width: w.unwrap_or(0),
                height: h.unwrap_or(0),
            }),
        }
    }

    /// Whether both dimensions satisfy the encoder constraint.
    pub fn is_encodable(&self) -> bool {
        self.width >= MIN_ENCODABLE_DIMENSION
            && self.height >= MIN_ENCODABLE_DIMENSION
            && self.width % 2 == 0
            && self.height % 2 == 0
    }

    /// Number of pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Nearest even integer (ties go down), never below the encoder minimum.
///
/// Returns `None` for non-finite values and values below one pixel.
pub fn round_even(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 1.0 {
        return None;
    }
    let half = value / 2.0;
    let pairs = if half.fract() == 0.5 {
        half.floor()
    } else {
        half.round()
    };
    let even = (pairs * 2.0).min(u32::MAX as f64) as u32;
    Some(even.max(MIN_ENCODABLE_DIMENSION))
}

/// Clamp an even dimension to the nearest even value not exceeding `available`.
pub fn clamp_even(desired: u32, available: u32) -> u32 {
    if desired <= available {
        desired
    } else {
        available - available % 2
    }
}

fn too_small(width: f64, height: f64) -> SpliceError {
    let px = |v: f64| if v.is_finite() { v.max(0.0).round() as u32 } else { 0 };
    SpliceError::TooSmallRegion {
        width: px(width),
        height: px(height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_request_rounds_down_to_even() {
        let size = FrameSize::even(1281.0, 721.0).unwrap();
        assert_eq!(size, FrameSize::new(1280, 720));
    }

    #[test]
    fn test_fractional_request_rounds_to_nearest_even() {
        assert_eq!(round_even(1281.6), Some(1282));
        assert_eq!(round_even(639.2), Some(640));
        assert_eq!(round_even(1.2), Some(2));
    }

    #[test]
    fn test_sub_pixel_request_is_too_small() {
        assert!(matches!(
            FrameSize::even(0.4, 100.0),
            Err(SpliceError::TooSmallRegion { .. })
        ));
        assert!(FrameSize::even(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn test_even_within_clamps_to_bounds() {
        let bounds = FrameSize::new(641, 480);
        let size = FrameSize::even_within(700.0, 300.0, bounds).unwrap();
        assert_eq!(size, FrameSize::new(640, 300));
    }

    #[test]
    fn test_even_within_rejects_collapsed_bounds() {
        let bounds = FrameSize::new(1, 480);
        let err = FrameSize::even_within(10.0, 10.0, bounds).unwrap_err();
        assert!(matches!(err, SpliceError::TooSmallRegion { width: 0, .. }));
    }

    #[test]
    fn test_is_encodable() {
        assert!(FrameSize::new(1280, 720).is_encodable());
        assert!(!FrameSize::new(1281, 720).is_encodable());
        assert!(!FrameSize::new(0, 0).is_encodable());
    }
}
