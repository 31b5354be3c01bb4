//! Normalized region types for crop and watermark placement.
//!
//! All coordinates are normalized to `[0.0, 1.0]` range.

use serde::{Deserialize, Serialize};
use splice_common::error::SpliceResult;

use crate::dimension::FrameSize;

/// Default minimum region edge, in pixels of the reference frame.
pub const MIN_PIXEL_SIZE: u32 = 20;

/// A rectangular region within a reference frame.
///
/// Coordinates are normalized: `(0.0, 0.0)` is top-left,
/// `(1.0, 1.0)` is bottom-right of the reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    /// Left edge (normalized).
    pub x: f64,
    /// Top edge (normalized).
    pub y: f64,
    /// Width (normalized).
    pub width: f64,
    /// Height (normalized).
    pub height: f64,
}

/// Minimum normalized size a region may shrink to.
///
/// Both minimums always lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectBounds {
    min_width: f64,
    min_height: f64,
}

impl RectBounds {
    /// Minimums are clamped into `[0, 1]`; non-finite values become 0.
    pub fn new(min_width: f64, min_height: f64) -> Self {
        let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            min_width: unit(min_width),
            min_height: unit(min_height),
        }
    }

    /// Derive the minimum size from a pixel constant and the reference frame.
    pub fn for_reference(reference: FrameSize, min_pixels: u32) -> Self {
        let ratio = |dim: u32| min_pixels as f64 / dim.max(1) as f64;
        Self::new(ratio(reference.width), ratio(reference.height))
    }

    pub fn min_width(&self) -> f64 {
        self.min_width
    }

    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    /// Whether a `width` x `height` region meets both minimums.
    pub fn admits(&self, width: f64, height: f64) -> bool {
        const EPS: f64 = 1e-9;
        width >= self.min_width - EPS && height >= self.min_height - EPS
    }
}

impl Default for RectBounds {
    fn default() -> Self {
        Self::new(0.01, 0.01)
    }
}

/// A region in whole pixels of a concrete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

impl NormalizedRect {
    /// The whole reference frame.
    pub const FULL: NormalizedRect = NormalizedRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp into `[0,1]²` while honouring the minimum size.
    ///
    /// Non-finite components fall back to the full-frame value.
    pub fn clamped(&self, bounds: &RectBounds) -> Self {
        let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        let width = finite_or(self.width, 1.0).clamp(bounds.min_width, 1.0);
        let height = finite_or(self.height, 1.0).clamp(bounds.min_height, 1.0);
        let x = finite_or(self.x, 0.0).clamp(0.0, 1.0 - width);
        let y = finite_or(self.y, 0.0).clamp(0.0, 1.0 - height);
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check every region invariant against `bounds`.
    pub fn is_valid(&self, bounds: &RectBounds) -> bool {
        const EPS: f64 = 1e-9;
        self.x >= 0.0
            && self.y >= 0.0
            && self.right() <= 1.0 + EPS
            && self.bottom() <= 1.0 + EPS
            && bounds.admits(self.width, self.height)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// The center point of this region.
    pub fn center(&self) -> Point2D {
        Point2D::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Check if a normalized point is within this region.
    pub fn contains(&self, p: Point2D) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Area of the region (0.0 to 1.0).
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Resolve to an encodable pixel region of `frame`.
    ///
    /// The origin is rounded to the nearest pixel; the size goes through the
    /// even-dimension policy and is clamped to what remains of the frame.
    pub fn to_pixels(&self, frame: FrameSize) -> SpliceResult<PixelRegion> {
        let px = |v: f64, dim: u32| (v * dim as f64).round().clamp(0.0, dim as f64) as u32;
        let x = px(self.x, frame.width);
        let y = px(self.y, frame.height);
        let remaining = FrameSize::new(frame.width - x, frame.height - y);
        let size = FrameSize::even_within(
            self.width * frame.width as f64,
            self.height * frame.height as f64,
            remaining,
        )?;
        Ok(PixelRegion {
            x,
            y,
            width: size.width,
            height: size.height,
        })
    }
}

impl Default for NormalizedRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// A 2D normalized point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamp into the unit square.
    pub fn clamped(&self) -> Point2D {
        Point2D::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}
