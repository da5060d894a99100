//! Pan/zoom view onto the board.

use crate::geometry::Rect;
use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Screen-space view of the infinite board.
///
/// `screen = world * zoom + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Translation in screen pixels.
    pub offset: Vec2,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 0.05,
            max_zoom: 16.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// World to screen.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen to world.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Pan by a delta in screen pixels.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom by `factor`, keeping `screen_point` fixed. Returns true if the
    /// zoom changed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) -> bool {
        let new_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if !new_zoom.is_finite() || (new_zoom - self.zoom).abs() < f64::EPSILON {
            return false;
        }
        let anchor = self.screen_to_world(screen_point);
        self.zoom = new_zoom;
        let moved = self.world_to_screen(anchor);
        self.offset += screen_point - moved;
        true
    }

    /// World-space rect shown in a viewport of the given size.
    pub fn visible_rect(&self, viewport: Size) -> Rect {
        let a = self.screen_to_world(Point::ZERO);
        let b = self.screen_to_world(Point::new(viewport.width, viewport.height));
        Rect::new(a.x as f32, a.y as f32, b.x as f32, b.y as f32)
    }

    /// Resolution chunks should be drawn at for the current zoom.
    ///
    /// Quantized to a power of two so small zoom steps reuse the existing
    /// tiles.
    pub fn raster_scale(&self) -> f64 {
        let zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
        2f64.powi(zoom.log2().ceil() as i32)
    }

    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }

    /// Frame `bounds` in the viewport with `padding` pixels on each side.
    pub fn fit_to_bounds(&mut self, bounds: &Rect, viewport: Size, padding: f64) {
        let bounds = bounds.normalized().to_kurbo();
        if bounds.is_zero_area() {
            self.reset();
            self.offset = Vec2::new(viewport.width / 2.0 - bounds.x0, viewport.height / 2.0 - bounds.y0);
            return;
        }
        let room = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );
        self.zoom = (room.width / bounds.width())
            .min(room.height / bounds.height())
            .clamp(self.min_zoom, self.max_zoom);
        let c = bounds.center();
        self.offset = Vec2::new(
            viewport.width / 2.0 - c.x * self.zoom,
            viewport.height / 2.0 - c.y * self.zoom,
        );
    }
}
