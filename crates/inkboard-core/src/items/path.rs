//! Freehand stroke item.

use super::{Stroke, point_to_segment_dist};
use crate::geometry::{Point, PressurePoint, Rect};
use serde::{Deserialize, Serialize};

/// A freehand stroke.
///
/// Points are stored normalized into `[0, 1] x [0, 1]` relative to the
/// owning item's rect, so moving or resizing the item never touches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    pub stroke: Stroke,
    pub points: Vec<PressurePoint>,
}

impl PathItem {
    /// Build a path from absolute board points.
    ///
    /// The bounding box is computed first, then every point is normalized
    /// against it. Returns `None` for an empty point list.
    pub fn from_absolute(points: Vec<PressurePoint>, stroke: Stroke) -> Option<(Self, Rect)> {
        let rect = Rect::bounding(points.iter().map(PressurePoint::point))?;
        let points = points
            .into_iter()
            .map(|p| PressurePoint {
                x: normalize_axis(p.x, rect.x, rect.x2),
                y: normalize_axis(p.y, rect.y, rect.y2),
                pressure: p.pressure,
            })
            .collect();
        Some((Self { stroke, points }, rect))
    }

    /// Simplify a raw stroke before normalizing it.
    pub fn from_stroke(
        points: Vec<PressurePoint>,
        stroke: Stroke,
        tolerance: f32,
    ) -> Option<(Self, Rect)> {
        let points = if points.len() < 3 {
            points
        } else {
            rdp_simplify(&points, tolerance)
        };
        Self::from_absolute(points, stroke)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A stroke that renders as a single dot.
    pub fn is_dot(&self) -> bool {
        match self.points.split_first() {
            Some((first, rest)) => rest.iter().all(|p| p.x == first.x && p.y == first.y),
            None => false,
        }
    }

    /// Radius of the dot drawn for single-point paths.
    pub fn dot_radius(&self) -> f32 {
        (self.stroke.weight * 0.5).max(0.5)
    }

    /// Map the normalized points back onto `rect`.
    ///
    /// Uses the signed extent of the rect so a flipped rect mirrors the
    /// stroke.
    pub fn absolute_points(&self, rect: &Rect) -> Vec<PressurePoint> {
        let (w, h) = (rect.x2 - rect.x, rect.y2 - rect.y);
        self.points
            .iter()
            .map(|p| PressurePoint {
                x: rect.x + p.x * w,
                y: rect.y + p.y * h,
                pressure: p.pressure,
            })
            .collect()
    }

    pub(super) fn hit_test(&self, rect: &Rect, point: Point, tolerance: f32) -> bool {
        let pts: Vec<Point> = self.absolute_points(rect).iter().map(PressurePoint::point).collect();
        let reach = tolerance + self.stroke.weight * 0.5;
        if pts.len() < 2 {
            return pts
                .first()
                .map(|p| point_to_segment_dist(point, *p, *p) <= reach.max(self.dot_radius()))
                .unwrap_or(false);
        }
        pts.windows(2)
            .any(|w| point_to_segment_dist(point, w[0], w[1]) <= reach)
    }
}

fn normalize_axis(v: f32, lo: f32, hi: f32) -> f32 {
    let extent = hi - lo;
    if extent.abs() < f32::EPSILON {
        0.0
    } else {
        (v - lo) / extent
    }
}

/// Ramer-Douglas-Peucker line simplification.
fn rdp_simplify(points: &[PressurePoint], tolerance: f32) -> Vec<PressurePoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_index = 0;
    for (i, p) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = point_to_segment_dist(p.point(), first.point(), last.point());
        if dist > max_dist {
            max_dist = dist;
            max_index = i;
        }
    }

    if max_dist > tolerance {
        let mut left = rdp_simplify(&points[..=max_index], tolerance);
        let right = rdp_simplify(&points[max_index..], tolerance);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}
