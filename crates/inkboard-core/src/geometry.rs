//! Geometry primitives shared by items, the spatial index and chunks.
//!
//! Board coordinates are `f32` because that is what the binary format
//! stores; conversions to `kurbo` types happen at the rendering boundary.

use serde::{Deserialize, Serialize};

/// A point on the board plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Convert to a kurbo point for path building.
    pub fn to_kurbo(self) -> kurbo::Point {
        kurbo::Point::new(self.x as f64, self.y as f64)
    }
}

impl From<kurbo::Point> for Point {
    fn from(p: kurbo::Point) -> Self {
        Self::new(p.x as f32, p.y as f32)
    }
}

/// A stylus sample: a point with an optional pressure in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PressurePoint {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
}

impl PressurePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, pressure: None }
    }

    /// Create a sample with pressure, clamped into `[0, 1]`.
    pub fn with_pressure(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            x,
            y,
            pressure: Some(pressure.clamp(0.0, 1.0)),
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for PressurePoint {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// Axis-aligned rectangle stored as two opposite corners.
///
/// The corners are not required to be ordered: a rect flipped by a resize
/// keeps `x2 < x` until [`Rect::normalize`] is called. Width and height are
/// always reported as absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, x2: f32, y2: f32) -> Self {
        Self { x, y, x2, y2 }
    }

    /// Rect spanning two corner points.
    pub fn from_points(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    pub fn from_origin_size(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// Smallest normalized rect containing every point, `None` when empty.
    pub fn bounding<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in iter {
            rect.x = rect.x.min(p.x);
            rect.y = rect.y.min(p.y);
            rect.x2 = rect.x2.max(p.x);
            rect.y2 = rect.y2.max(p.y);
        }
        Some(rect)
    }

    pub fn w(&self) -> f32 {
        (self.x2 - self.x).abs()
    }

    pub fn h(&self) -> f32 {
        (self.y2 - self.y).abs()
    }

    pub fn min_x(&self) -> f32 {
        self.x.min(self.x2)
    }

    pub fn min_y(&self) -> f32 {
        self.y.min(self.y2)
    }

    pub fn max_x(&self) -> f32 {
        self.x.max(self.x2)
    }

    pub fn max_y(&self) -> f32 {
        self.y.max(self.y2)
    }

    /// Reorder the corners so that `x <= x2` and `y <= y2`.
    pub fn normalize(&mut self) {
        *self = self.normalized();
    }

    pub fn normalized(&self) -> Self {
        Self::new(self.min_x(), self.min_y(), self.max_x(), self.max_y())
    }

    pub fn area(&self) -> f32 {
        self.w() * self.h()
    }

    pub fn center(&self) -> Point {
        Point::new((self.x + self.x2) * 0.5, (self.y + self.y2) * 0.5)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Closed-interval overlap test: rects that only touch along an edge
    /// or a corner intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x() <= other.max_x()
            && self.max_x() >= other.min_x()
            && self.min_y() <= other.max_y()
            && self.max_y() >= other.min_y()
    }

    /// Closed-interval containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x <= self.max_x() && p.y >= self.min_y() && p.y <= self.max_y()
    }

    /// Grow this rect in place to cover `other`. The result is normalized.
    pub fn append(&mut self, other: &Rect) {
        *self = self.union(other);
    }

    pub fn union(&self, other: &Rect) -> Self {
        Self::new(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
    }

    /// Overlapping region, `None` when the rects are disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self::new(
            self.min_x().max(other.min_x()),
            self.min_y().max(other.min_y()),
            self.max_x().min(other.max_x()),
            self.max_y().min(other.max_y()),
        ))
    }

    /// Normalized copy grown by `dx`/`dy` on every side.
    pub fn inflate(&self, dx: f32, dy: f32) -> Self {
        let n = self.normalized();
        Self::new(n.x - dx, n.y - dy, n.x2 + dx, n.y2 + dy)
    }

    /// Move both corners, preserving orientation.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        self.x2 += dx;
        self.y2 += dy;
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        let mut r = *self;
        r.translate(dx, dy);
        r
    }

    /// Move the first corner, leaving the second in place.
    pub fn set_start(&mut self, p: Point) {
        self.x = p.x;
        self.y = p.y;
    }

    /// Move the second corner, leaving the first in place.
    pub fn set_end(&mut self, p: Point) {
        self.x2 = p.x;
        self.y2 = p.y;
    }

    pub fn to_kurbo(&self) -> kurbo::Rect {
        let n = self.normalized();
        kurbo::Rect::new(n.x as f64, n.y as f64, n.x2 as f64, n.y2 as f64)
    }
}

impl From<kurbo::Rect> for Rect {
    fn from(r: kurbo::Rect) -> Self {
        Self::new(r.x0 as f32, r.y0 as f32, r.x1 as f32, r.y1 as f32)
    }
}
