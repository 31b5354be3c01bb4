//! Pixel transforms applied on the re-encode path.
//!
//! A transform maps `(frame, source_rect, target)` to a new frame of exactly
//! `target` size. `source_rect` selects the part of the input to use; the
//! normalizer passes [`NormalizedRect::FULL`] unless a crop is in effect.

use std::fmt;
use std::sync::Arc;

use splice_common::error::{SpliceError, SpliceResult};
use splice_edit_model::dimension::FrameSize;
use splice_edit_model::rect::{NormalizedRect, PixelRegion, RectBounds};
use splice_media_engine::sample::VideoFrame;

/// A pure frame-to-frame operation.
pub trait FrameTransform: Send + Sync + fmt::Debug {
    fn apply(
        &self,
        frame: &VideoFrame,
        source_rect: &NormalizedRect,
        target: FrameSize,
    ) -> SpliceResult<VideoFrame>;

    /// Output size this transform wants for a given source size, if any.
    fn preferred_size(&self, _source: FrameSize) -> SpliceResult<Option<FrameSize>> {
        Ok(None)
    }

    /// Fail with `TooSmallRegion` when a region this transform uses would
    /// cover fewer than `min_px` pixels on either edge, for a clip of
    /// `source` size written at `target` size.
    fn check_regions(&self, _source: FrameSize, _target: FrameSize, _min_px: u32) -> SpliceResult<()> {
        Ok(())
    }

    /// Short name for logs and reports.
    fn name(&self) -> String;
}

/// Nearest-neighbour rescale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rescale;

impl FrameTransform for Rescale {
    fn apply(
        &self,
        frame: &VideoFrame,
        source_rect: &NormalizedRect,
        target: FrameSize,
    ) -> SpliceResult<VideoFrame> {
        let region = source_region(frame, source_rect)?;
        resample(frame, region, target)
    }

    fn name(&self) -> String {
        "rescale".to_string()
    }
}

/// BT.601 luma, then rescale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl FrameTransform for Grayscale {
    fn apply(
        &self,
        frame: &VideoFrame,
        source_rect: &NormalizedRect,
        target: FrameSize,
    ) -> SpliceResult<VideoFrame> {
        let scaled = Rescale.apply(frame, source_rect, target)?;
        let mut data = scaled.data().to_vec();
        for px in data.chunks_exact_mut(4) {
            let y = luma(px[0], px[1], px[2]);
            px[0] = y;
            px[1] = y;
            px[2] = y;
        }
        VideoFrame::new(target.width, target.height, data)
    }

    fn name(&self) -> String {
        "grayscale".to_string()
    }
}

/// Keep `rect` of the source, then rescale.
#[derive(Debug, Clone, Copy)]
pub struct Crop {
    pub rect: NormalizedRect,
}

impl Crop {
    pub fn new(rect: NormalizedRect) -> Self {
        Self { rect }
    }
}

impl FrameTransform for Crop {
    fn apply(
        &self,
        frame: &VideoFrame,
        source_rect: &NormalizedRect,
        target: FrameSize,
    ) -> SpliceResult<VideoFrame> {
        let rect = nest(source_rect, &self.rect);
        Rescale.apply(frame, &rect, target)
    }

    /// The crop region's even pixel size. Fails with `TooSmallRegion`.
    fn preferred_size(&self, source: FrameSize) -> SpliceResult<Option<FrameSize>> {
        Ok(Some(self.rect.to_pixels(source)?.size()))
    }

    fn check_regions(&self, source: FrameSize, _target: FrameSize, min_px: u32) -> SpliceResult<()> {
        check_region(&self.rect, source, min_px)
    }

    fn name(&self) -> String {
        "crop".to_string()
    }
}

/// Alpha-composite `image` over the frame at `placement`.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub image: VideoFrame,
    /// Where the image goes, relative to the output frame.
    pub placement: NormalizedRect,
    /// Overall opacity in `[0, 1]`.
    pub opacity: f32,
}

impl FrameTransform for Watermark {
    fn apply(
        &self,
        frame: &VideoFrame,
        source_rect: &NormalizedRect,
        target: FrameSize,
    ) -> SpliceResult<VideoFrame> {
        let base = Rescale.apply(frame, source_rect, target)?;
        let region = self.placement.to_pixels(target)?;
        let mark = resample(
            &self.image,
            full_region(&self.image),
            region.size(),
        )?;

        let opacity = self.opacity.clamp(0.0, 1.0);
        let stride = target.width as usize * 4;
        let mut data = base.data().to_vec();
        for row in 0..region.height as usize {
            for col in 0..region.width as usize {
                let src = (row * region.width as usize + col) * 4;
                let dst = (region.y as usize + row) * stride + (region.x as usize + col) * 4;
                let alpha = mark.data()[src + 3] as f32 / 255.0 * opacity;
                for c in 0..3 {
                    let over = mark.data()[src + c] as f32;
                    let under = data[dst + c] as f32;
                    data[dst + c] = (over * alpha + under * (1.0 - alpha)).round() as u8;
                }
            }
        }
        VideoFrame::new(target.width, target.height, data)
    }

    fn check_regions(&self, _source: FrameSize, target: FrameSize, min_px: u32) -> SpliceResult<()> {
        check_region(&self.placement, target, min_px)
    }

    fn name(&self) -> String {
        "watermark".to_string()
    }
}

/// Transforms applied in order.
///
/// The first stage sees the caller's `source_rect`; later stages see the
/// whole previous result.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<dyn FrameTransform>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: impl FrameTransform + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FrameTransform for Chain {
    fn apply(
        &self,
        frame: &VideoFrame,
        source_rect: &NormalizedRect,
        target: FrameSize,
    ) -> SpliceResult<VideoFrame> {
        let mut stages = self.stages.iter();
        let Some(first) = stages.next() else {
            return Rescale.apply(frame, source_rect, target);
        };
        let mut current = first.apply(frame, source_rect, target)?;
        for stage in stages {
            current = stage.apply(&current, &NormalizedRect::FULL, target)?;
        }
        Ok(current)
    }

    fn preferred_size(&self, source: FrameSize) -> SpliceResult<Option<FrameSize>> {
        let mut preferred = None;
        for stage in &self.stages {
            if let Some(size) = stage.preferred_size(preferred.unwrap_or(source))? {
                preferred = Some(size);
            }
        }
        Ok(preferred)
    }

    fn check_regions(&self, source: FrameSize, target: FrameSize, min_px: u32) -> SpliceResult<()> {
        for (index, stage) in self.stages.iter().enumerate() {
            let input = if index == 0 { source } else { target };
            stage.check_regions(input, target, min_px)?;
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// `rect` of `reference` must keep at least `min_px` pixels per edge.
pub(crate) fn check_region(rect: &NormalizedRect, reference: FrameSize, min_px: u32) -> SpliceResult<()> {
    let region = rect.to_pixels(reference)?;
    if !RectBounds::for_reference(reference, min_px).admits(rect.width, rect.height) {
        return Err(SpliceError::TooSmallRegion {
            width: region.width,
            height: region.height,
        });
    }
    Ok(())
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// `inner` expressed relative to `outer`, both normalized.
fn nest(outer: &NormalizedRect, inner: &NormalizedRect) -> NormalizedRect {
    NormalizedRect::new(
        outer.x + inner.x * outer.width,
        outer.y + inner.y * outer.height,
        inner.width * outer.width,
        inner.height * outer.height,
    )
}

fn full_region(frame: &VideoFrame) -> PixelRegion {
    PixelRegion {
        x: 0,
        y: 0,
        width: frame.width(),
        height: frame.height(),
    }
}

fn source_region(frame: &VideoFrame, rect: &NormalizedRect) -> SpliceResult<PixelRegion> {
    if *rect == NormalizedRect::FULL {
        return Ok(full_region(frame));
    }
    rect.to_pixels(frame.size())
}

fn resample(frame: &VideoFrame, region: PixelRegion, target: FrameSize) -> SpliceResult<VideoFrame> {
    if target.width == 0 || target.height == 0 || region.width == 0 || region.height == 0 {
        return Err(SpliceError::TooSmallRegion {
            width: target.width.min(region.width),
            height: target.height.min(region.height),
        });
    }
    if region == full_region(frame) && frame.size() == target {
        return Ok(frame.clone());
    }
    let src = frame.data();
    let src_stride = frame.width() as usize * 4;
    let mut data = Vec::with_capacity(target.area() as usize * 4);
    for ty in 0..target.height as u64 {
        let sy = region.y as u64 + ty * region.height as u64 / target.height as u64;
        for tx in 0..target.width as u64 {
            let sx = region.x as u64 + tx * region.width as u64 / target.width as u64;
            let i = sy as usize * src_stride + sx as usize * 4;
            data.extend_from_slice(&src[i..i + 4]);
        }
    }
    VideoFrame::new(target.width, target.height, data)
}
