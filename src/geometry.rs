//! Rectangles in window coordinates.
//!
//! A [`Rect`] is stored as `left, top, right, bottom` in pixels, with `(0, 0)` at the
//! top-left corner of a window or texture and `y` growing downwards. Window records always
//! keep their own rect normalized so that its top-left corner sits at the origin.
//!
//! # Examples
//!
//! ```
//! use stimgl::geometry::Rect;
//!
//! let win = Rect::from_size(800.0, 600.0);
//! let tex = Rect::from_size(64.0, 64.0);
//!
//! let centered = tex.center_in(&win);
//! assert_eq!(centered, Rect::new(368.0, 268.0, 432.0, 332.0));
//! assert!(win.contains(&centered));
//! ```

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    /// Creates a rect of the given size with its top-left corner at the origin.
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// A rect is valid when it is not inverted and all its edges are finite.
    pub fn is_valid(&self) -> bool {
        [self.left, self.top, self.right, self.bottom].iter().all(|v| v.is_finite())
            && self.left <= self.right
            && self.top <= self.bottom
    }

    /// True for zero-area rects. Drawing commands silently skip those.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// True if `other` lies completely inside (or on the border of) this rect.
    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.left + self.right) * 0.5, (self.top + self.bottom) * 0.5)
    }

    /// Returns a copy of this rect, moved so that it is centered inside `outer`.
    pub fn center_in(&self, outer: &Rect) -> Rect {
        let (cx, cy) = outer.center();
        let (hw, hh) = (self.width() * 0.5, self.height() * 0.5);
        Rect::new(cx - hw, cy - hh, cx + hw, cy + hh)
    }

    /// Moves the rect so its top-left corner sits at the origin.
    pub fn normalized(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }

    /// Returns the left half of the rect, used for side-by-side stereo windows.
    pub fn left_half(&self) -> Rect {
        Rect::new(self.left, self.top, self.left + self.width() / 2.0, self.bottom)
    }

    /// True if both rects have the same width and height.
    pub fn same_size(&self, other: &Rect) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }

    /// Integer pixel bounds `(x, y, width, height)`, rounding edges to the nearest pixel.
    pub fn to_pixels(&self) -> (i32, i32, u32, u32) {
        let x = self.left.round() as i32;
        let y = self.top.round() as i32;
        let w = (self.right.round() as i32 - x).max(0) as u32;
        let h = (self.bottom.round() as i32 - y).max(0) as u32;
        (x, y, w, h)
    }
}

impl From<[f64; 4]> for Rect {
    fn from(v: [f64; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_and_emptiness() {
        assert!(Rect::new(0.0, 0.0, 10.0, 10.0).is_valid());
        assert!(!Rect::new(10.0, 0.0, 0.0, 10.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, f64::NAN, 10.0).is_valid());

        assert!(Rect::new(5.0, 5.0, 5.0, 9.0).is_empty());
        assert!(!Rect::from_size(1.0, 1.0).is_empty());
    }

    #[test]
    fn containment_includes_border() {
        let outer = Rect::from_size(64.0, 64.0);
        assert!(outer.contains(&Rect::from_size(64.0, 64.0)));
        assert!(outer.contains(&Rect::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!outer.contains(&Rect::new(-1.0, 0.0, 20.0, 20.0)));
        assert!(!outer.contains(&Rect::new(0.0, 0.0, 64.5, 20.0)));
    }

    #[test]
    fn pixel_bounds_round_edges() {
        assert_eq!(Rect::new(0.4, 1.6, 10.4, 11.5).to_pixels(), (0, 2, 10, 10));
        assert_eq!(Rect::new(5.0, 5.0, 2.0, 2.0).to_pixels(), (5, 5, 0, 0));
    }
}
