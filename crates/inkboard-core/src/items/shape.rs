//! Rectangle and ellipse payloads.

use super::Stroke;
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Payload shared by rectangles and ellipses; the geometry is the item rect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeItem {
    pub stroke: Stroke,
    #[serde(default)]
    pub filled: bool,
}

impl ShapeItem {
    pub(super) fn hit_test_rect(&self, rect: &Rect, point: Point, tolerance: f32) -> bool {
        let half = self.stroke.weight * 0.5 + tolerance;
        if self.filled {
            return rect.inflate(tolerance, tolerance).contains(point);
        }
        let outer = rect.inflate(half, half);
        let inner = rect.inflate(-half, -half);
        let inside_inner = inner.x < inner.x2 && inner.y < inner.y2 && inner.contains(point);
        outer.contains(point) && !inside_inner
    }

    pub(super) fn hit_test_ellipse(&self, rect: &Rect, point: Point, tolerance: f32) -> bool {
        let c = rect.center();
        let (rx, ry) = (rect.w() * 0.5, rect.h() * 0.5);
        let half = self.stroke.weight * 0.5 + tolerance;
        let outer = normalized_radius(point, c, rx + half, ry + half);
        if self.filled {
            return outer <= 1.0;
        }
        let inner_rx = rx - half;
        let inner_ry = ry - half;
        if inner_rx <= 0.0 || inner_ry <= 0.0 {
            return outer <= 1.0;
        }
        outer <= 1.0 && normalized_radius(point, c, inner_rx, inner_ry) >= 1.0
    }
}

fn normalized_radius(p: Point, c: Point, rx: f32, ry: f32) -> f32 {
    if rx <= 0.0 || ry <= 0.0 {
        return f32::INFINITY;
    }
    let dx = (p.x - c.x) / rx;
    let dy = (p.y - c.y) / ry;
    dx * dx + dy * dy
}
