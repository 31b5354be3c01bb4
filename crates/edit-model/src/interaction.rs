//! Pointer interaction state machine for region editing.
//!
//! A gesture starts with [`RectInteraction::on_pointer_down`], which hit-tests
//! the current region: a resize handle starts `Resizing`, the body starts
//! `Moving`, and empty space starts `Creating` a fresh region anchored at the
//! down point. Every recomputed region is clamped to the minimum size and to
//! the unit square.

use serde::{Deserialize, Serialize};

use crate::rect::{NormalizedRect, Point2D, RectBounds};

/// One of the eight resize handles around a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeHandle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::TopLeft,
        ResizeHandle::Top,
        ResizeHandle::TopRight,
        ResizeHandle::Right,
        ResizeHandle::BottomRight,
        ResizeHandle::Bottom,
        ResizeHandle::BottomLeft,
        ResizeHandle::Left,
    ];

    /// Where the handle sits on `rect`.
    pub fn position(&self, rect: &NormalizedRect) -> Point2D {
        let cx = rect.x + rect.width / 2.0;
        let cy = rect.y + rect.height / 2.0;
        let (x, y) = match self {
            ResizeHandle::TopLeft => (rect.x, rect.y),
            ResizeHandle::Top => (cx, rect.y),
            ResizeHandle::TopRight => (rect.right(), rect.y),
            ResizeHandle::Right => (rect.right(), cy),
            ResizeHandle::BottomRight => (rect.right(), rect.bottom()),
            ResizeHandle::Bottom => (cx, rect.bottom()),
            ResizeHandle::BottomLeft => (rect.x, rect.bottom()),
            ResizeHandle::Left => (rect.x, cy),
        };
        Point2D::new(x, y)
    }

    fn moves_left(&self) -> bool {
        matches!(
            self,
            ResizeHandle::TopLeft | ResizeHandle::Left | ResizeHandle::BottomLeft
        )
    }

    fn moves_right(&self) -> bool {
        matches!(
            self,
            ResizeHandle::TopRight | ResizeHandle::Right | ResizeHandle::BottomRight
        )
    }

    fn moves_top(&self) -> bool {
        matches!(
            self,
            ResizeHandle::TopLeft | ResizeHandle::Top | ResizeHandle::TopRight
        )
    }

    fn moves_bottom(&self) -> bool {
        matches!(
            self,
            ResizeHandle::BottomLeft | ResizeHandle::Bottom | ResizeHandle::BottomRight
        )
    }
}

/// What a pointer-down landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Handle(ResizeHandle),
    Body,
    Empty,
}

/// Current interaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Creating,
    Moving,
    Resizing(ResizeHandle),
}

/// Interaction tuning.
#[derive(Debug, Clone, Copy)]
pub struct InteractionConfig {
    /// Distance (normalized) within which a pointer grabs a handle.
    pub handle_tolerance: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            handle_tolerance: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Gesture {
    /// Region before the gesture started (`None` when creating from nothing).
    before: Option<NormalizedRect>,
    /// Region the gesture computes from.
    initial: NormalizedRect,
    origin: Point2D,
}

/// Region editor driven by pointer events.
#[derive(Debug, Clone)]
pub struct RectInteraction {
    rect: Option<NormalizedRect>,
    bounds: RectBounds,
    config: InteractionConfig,
    state: InteractionState,
    gesture: Option<Gesture>,
}

impl RectInteraction {
    pub fn new(bounds: RectBounds) -> Self {
        Self::with_config(bounds, InteractionConfig::default())
    }

    pub fn with_config(bounds: RectBounds, config: InteractionConfig) -> Self {
        Self {
            rect: None,
            bounds,
            config,
            state: InteractionState::Idle,
            gesture: None,
        }
    }

    /// Start with an existing region (clamped to the bounds).
    pub fn with_rect(mut self, rect: NormalizedRect) -> Self {
        self.rect = Some(rect.clamped(&self.bounds));
        self
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn rect(&self) -> Option<NormalizedRect> {
        self.rect
    }

    pub fn bounds(&self) -> RectBounds {
        self.bounds
    }

    /// Classify a point against the current region.
    pub fn hit_test(&self, p: Point2D) -> HitTarget {
        let Some(rect) = self.rect else {
            return HitTarget::Empty;
        };
        let tolerance = self.config.handle_tolerance;
        let nearest = ResizeHandle::ALL
            .iter()
            .map(|h| (*h, h.position(&rect).distance_to(&p)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((handle, _)) => HitTarget::Handle(handle),
            None if rect.contains(p) => HitTarget::Body,
            None => HitTarget::Empty,
        }
    }

    /// Begin a gesture. Non-finite points are ignored.
    pub fn on_pointer_down(&mut self, p: Point2D) -> InteractionState {
        if !p.is_finite() {
            return self.state;
        }
        let origin = p.clamped();
        let (state, initial) = match self.hit_test(origin) {
            HitTarget::Handle(handle) => (InteractionState::Resizing(handle), self.rect),
            HitTarget::Body => (InteractionState::Moving, self.rect),
            HitTarget::Empty => (InteractionState::Creating, None),
        };
        let initial = initial.unwrap_or_else(|| creation_rect(origin, origin, &self.bounds));
        self.gesture = Some(Gesture {
            before: self.rect,
            initial,
            origin,
        });
        if state == InteractionState::Creating {
            self.rect = Some(initial);
        }
        self.state = state;
        tracing::trace!(?state, x = origin.x, y = origin.y, "Region gesture started");
        state
    }

    /// Recompute the region for the current pointer position.
    pub fn on_pointer_move(&mut self, p: Point2D) -> Option<NormalizedRect> {
        let gesture = self.gesture?;
        let current = if p.is_finite() { p } else { gesture.origin };
        let next = compute_rect(
            self.state,
            &gesture.initial,
            gesture.origin,
            current,
            &self.bounds,
        );
        self.rect = Some(next);
        self.rect
    }

    /// End the gesture unconditionally.
    pub fn on_pointer_up(&mut self) -> Option<NormalizedRect> {
        self.state = InteractionState::Idle;
        self.gesture = None;
        self.rect
    }

    /// Abort the gesture and restore the region it started from.
    pub fn cancel(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            self.rect = gesture.before;
        }
        self.state = InteractionState::Idle;
    }

    /// Drop the region entirely.
    pub fn clear(&mut self) {
        self.rect = None;
        self.gesture = None;
        self.state = InteractionState::Idle;
    }
}

/// Pure region recomputation for one pointer position.
///
/// `current` is clamped into the unit square; a non-finite `current` is a
/// zero delta.
pub fn compute_rect(
    state: InteractionState,
    initial: &NormalizedRect,
    origin: Point2D,
    current: Point2D,
    bounds: &RectBounds,
) -> NormalizedRect {
    let current = if current.is_finite() {
        current.clamped()
    } else {
        origin
    };
    let dx = current.x - origin.x;
    let dy = current.y - origin.y;

    match state {
        InteractionState::Idle => initial.clamped(bounds),
        InteractionState::Creating => creation_rect(origin, current, bounds),
        InteractionState::Moving => NormalizedRect::new(
            (initial.x + dx).clamp(0.0, 1.0 - initial.width),
            (initial.y + dy).clamp(0.0, 1.0 - initial.height),
            initial.width,
            initial.height,
        )
        .clamped(bounds),
        InteractionState::Resizing(handle) => {
            let mut left = initial.x;
            let mut top = initial.y;
            let mut right = initial.right().min(1.0);
            let mut bottom = initial.bottom().min(1.0);

            if handle.moves_left() {
                left = (left + dx).clamp(0.0, (right - bounds.min_width()).max(0.0));
            }
            if handle.moves_right() {
                right = (right + dx).clamp((left + bounds.min_width()).min(1.0), 1.0);
            }
            if handle.moves_top() {
                top = (top + dy).clamp(0.0, (bottom - bounds.min_height()).max(0.0));
            }
            if handle.moves_bottom() {
                bottom = (bottom + dy).clamp((top + bounds.min_height()).min(1.0), 1.0);
            }
            NormalizedRect::new(left, top, right - left, bottom - top).clamped(bounds)
        }
    }
}

/// Region spanned between an anchor and the pointer, grown to the minimum
/// size in the drag direction.
fn creation_rect(anchor: Point2D, current: Point2D, bounds: &RectBounds) -> NormalizedRect {
    let span = |a: f64, c: f64, min: f64| {
        let (mut lo, mut hi) = if c >= a { (a, c) } else { (c, a) };
        if hi - lo < min {
            if c >= a {
                hi = lo + min;
            } else {
                lo = hi - min;
            }
        }
        // Shift back inside the unit interval, keeping the size.
        if hi > 1.0 {
            lo -= hi - 1.0;
            hi = 1.0;
        }
        if lo < 0.0 {
            hi -= lo;
            lo = 0.0;
        }
        (lo, hi.min(1.0))
    };
    let (left, right) = span(anchor.x, current.x, bounds.min_width());
    let (top, bottom) = span(anchor.y, current.y, bounds.min_height());
    NormalizedRect::new(left, top, right - left, bottom - top).clamped(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bounds() -> RectBounds {
        RectBounds::new(0.05, 0.1)
    }

    fn editor_with(rect: NormalizedRect) -> RectInteraction {
        RectInteraction::new(bounds()).with_rect(rect)
    }

    #[test]
    fn test_drag_on_empty_space_creates_rect() {
        let mut editor = RectInteraction::new(bounds());
        assert_eq!(
            editor.on_pointer_down(Point2D::new(0.2, 0.2)),
            InteractionState::Creating
        );
        let rect = editor.on_pointer_move(Point2D::new(0.6, 0.5)).unwrap();
        assert!((rect.x - 0.2).abs() < 1e-12);
        assert!((rect.width - 0.4).abs() < 1e-12);
        assert!((rect.height - 0.3).abs() < 1e-12);
        editor.on_pointer_up();
        assert_eq!(editor.state(), InteractionState::Idle);
    }

    #[test]
    fn test_backwards_drag_creates_normalized_rect() {
        let mut editor = RectInteraction::new(bounds());
        editor.on_pointer_down(Point2D::new(0.6, 0.6));
        let rect = editor.on_pointer_move(Point2D::new(0.2, 0.3)).unwrap();
        assert!((rect.x - 0.2).abs() < 1e-12);
        assert!((rect.y - 0.3).abs() < 1e-12);
        assert!((rect.right() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_click_without_drag_yields_minimum_rect() {
        let mut editor = RectInteraction::new(bounds());
        editor.on_pointer_down(Point2D::new(0.99, 0.99));
        let rect = editor.on_pointer_up().unwrap();
        assert!(rect.is_valid(&bounds()));
        assert!((rect.width - 0.05).abs() < 1e-12);
        assert!((rect.height - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_body_hit_moves_and_clamps() {
        let mut editor = editor_with(NormalizedRect::new(0.4, 0.4, 0.2, 0.2));
        assert_eq!(
            editor.on_pointer_down(Point2D::new(0.5, 0.5)),
            InteractionState::Moving
        );
        let rect = editor.on_pointer_move(Point2D::new(1.0, 0.5)).unwrap();
        assert!((rect.x - 0.8).abs() < 1e-12);
        assert!((rect.width - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_corner_resize_keeps_opposite_corner() {
        let mut editor = editor_with(NormalizedRect::new(0.2, 0.2, 0.4, 0.4));
        assert_eq!(
            editor.on_pointer_down(Point2D::new(0.6, 0.6)),
            InteractionState::Resizing(ResizeHandle::BottomRight)
        );
        let rect = editor.on_pointer_move(Point2D::new(0.7, 0.9)).unwrap();
        assert!((rect.x - 0.2).abs() < 1e-12);
        assert!((rect.y - 0.2).abs() < 1e-12);
        assert!((rect.right() - 0.7).abs() < 1e-12);
        assert!((rect.bottom() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_edge_resize_stops_at_minimum() {
        let mut editor = editor_with(NormalizedRect::new(0.2, 0.2, 0.4, 0.4));
        editor.on_pointer_down(Point2D::new(0.2, 0.4));
        assert_eq!(editor.state(), InteractionState::Resizing(ResizeHandle::Left));
        let rect = editor.on_pointer_move(Point2D::new(0.9, 0.4)).unwrap();
        assert!((rect.width - 0.05).abs() < 1e-12);
        assert!((rect.right() - 0.6).abs() < 1e-12);
        assert!((rect.y - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_nan_move_is_zero_delta() {
        let start = NormalizedRect::new(0.2, 0.2, 0.4, 0.4);
        let mut editor = editor_with(start);
        editor.on_pointer_down(Point2D::new(0.4, 0.4));
        let rect = editor
            .on_pointer_move(Point2D::new(f64::NAN, 0.9))
            .unwrap();
        assert_eq!(rect, start);
    }

    #[test]
    fn test_nan_down_is_ignored() {
        let mut editor = RectInteraction::new(bounds());
        assert_eq!(
            editor.on_pointer_down(Point2D::new(f64::NAN, 0.1)),
            InteractionState::Idle
        );
        assert!(editor.on_pointer_move(Point2D::new(0.5, 0.5)).is_none());
    }

    #[test]
    fn test_cancel_restores_previous_rect() {
        let start = NormalizedRect::new(0.2, 0.2, 0.4, 0.4);
        let mut editor = editor_with(start);
        editor.on_pointer_down(Point2D::new(0.4, 0.4));
        editor.on_pointer_move(Point2D::new(0.5, 0.5));
        editor.cancel();
        assert_eq!(editor.rect(), Some(start));
        assert_eq!(editor.state(), InteractionState::Idle);
        assert!(editor.on_pointer_move(Point2D::new(0.9, 0.9)).is_none());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Down(f64, f64),
        Move(f64, f64),
        Up,
        Cancel,
    }

    fn coord() -> impl Strategy<Value = f64> {
        prop_oneof![
            8 => -0.5f64..1.5,
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
        ]
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (coord(), coord()).prop_map(|(x, y)| Step::Down(x, y)),
            (coord(), coord()).prop_map(|(x, y)| Step::Move(x, y)),
            Just(Step::Up),
            Just(Step::Cancel),
        ]
    }

    proptest! {
        #[test]
        fn prop_rect_stays_valid(steps in prop::collection::vec(step(), 1..40)) {
            let mut editor = RectInteraction::new(bounds());
            for step in steps {
                match step {
                    Step::Down(x, y) => { editor.on_pointer_down(Point2D::new(x, y)); }
                    Step::Move(x, y) => { editor.on_pointer_move(Point2D::new(x, y)); }
                    Step::Up => { editor.on_pointer_up(); }
                    Step::Cancel => editor.cancel(),
                }
                if let Some(rect) = editor.rect() {
                    prop_assert!(rect.is_valid(&bounds()), "invalid rect {:?}", rect);
                }
            }
        }
    }
}
