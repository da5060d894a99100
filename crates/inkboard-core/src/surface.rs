//! Drawing surface abstraction.
//!
//! The engine decides *what* to draw on each tile; a [`Surface`]
//! implementation decides how pixels are produced. All coordinates passed
//! to a surface are board coordinates; the surface maps them onto its own
//! pixel grid.

use crate::chunks::TileKey;
use crate::geometry::Rect;
use crate::items::{BoardItem, ItemKind, TextAlign};
use kurbo::{BezPath, Ellipse};
use peniko::Color;

/// Stroke/fill parameters for a shape primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub color: Color,
    pub width: f64,
    pub filled: bool,
}

/// A 2D drawing context owned by one chunk.
pub trait Surface {
    /// Fill the whole surface with `color`.
    fn clear(&mut self, color: Color);

    /// Fill a region with a flat color, replacing what is there.
    fn fill_rect(&mut self, rect: kurbo::Rect, color: Color);

    fn rect(&mut self, rect: kurbo::Rect, paint: &Paint);

    fn ellipse(&mut self, ellipse: Ellipse, paint: &Paint);

    /// Stroke a path; `paint.filled` is ignored.
    fn path(&mut self, path: &BezPath, paint: &Paint);

    fn image(&mut self, src: &str, rect: kurbo::Rect);

    fn text(&mut self, text: &str, rect: kurbo::Rect, font_size: f64, alignment: TextAlign, color: Color);

    /// Run `draw` with every primitive clipped to `region`.
    fn scissor(&mut self, region: kurbo::Rect, draw: &mut dyn FnMut(&mut Self));
}

/// Creates the surface for a newly materialized chunk.
pub trait SurfaceFactory {
    type Surface: Surface;

    /// `bounds` is the tile's board-space rect; `scale` is pixels per unit.
    fn create(&mut self, tile: TileKey, bounds: Rect, scale: f64) -> Self::Surface;
}

/// Draw one item onto a surface.
pub fn paint_item<S: Surface + ?Sized>(surface: &mut S, item: &BoardItem) {
    let rect = item.bounds().to_kurbo();
    match &item.kind {
        ItemKind::Path(path) => {
            let color = path.stroke.color();
            let points = path.absolute_points(&item.rect);
            if path.is_dot() {
                let center = points[0].point().to_kurbo();
                let r = path.dot_radius() as f64;
                let paint = Paint { color, width: 0.0, filled: true };
                surface.ellipse(Ellipse::new(center, (r, r), 0.0), &paint);
                return;
            }
            let weight = path.stroke.weight as f64;
            if points.iter().all(|p| p.pressure.is_none()) {
                let mut bez = BezPath::new();
                for (i, p) in points.iter().enumerate() {
                    if i == 0 {
                        bez.move_to(p.point().to_kurbo());
                    } else {
                        bez.line_to(p.point().to_kurbo());
                    }
                }
                surface.path(&bez, &Paint { color, width: weight, filled: false });
                return;
            }
            // Pressure-modulated strokes go out segment by segment.
            for w in points.windows(2) {
                let pressure = (w[0].pressure.unwrap_or(1.0) + w[1].pressure.unwrap_or(1.0)) * 0.5;
                let mut seg = BezPath::new();
                seg.move_to(w[0].point().to_kurbo());
                seg.line_to(w[1].point().to_kurbo());
                let width = (weight * pressure as f64).max(weight * 0.1);
                surface.path(&seg, &Paint { color, width, filled: false });
            }
        }
        ItemKind::Rectangle(shape) => {
            let paint = Paint {
                color: shape.stroke.color(),
                width: shape.stroke.weight as f64,
                filled: shape.filled,
            };
            surface.rect(rect, &paint);
        }
        ItemKind::Ellipse(shape) => {
            let paint = Paint {
                color: shape.stroke.color(),
                width: shape.stroke.weight as f64,
                filled: shape.filled,
            };
            surface.ellipse(Ellipse::from_rect(rect), &paint);
        }
        ItemKind::Image(image) => surface.image(&image.src, rect),
        ItemKind::Text(text) => {
            surface.text(&text.text, rect, text.font_size as f64, text.alignment, text.stroke.color())
        }
    }
}

/// A surface that draws nothing, for headless sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn clear(&mut self, _color: Color) {}
    fn fill_rect(&mut self, _rect: kurbo::Rect, _color: Color) {}
    fn rect(&mut self, _rect: kurbo::Rect, _paint: &Paint) {}
    fn ellipse(&mut self, _ellipse: Ellipse, _paint: &Paint) {}
    fn path(&mut self, _path: &BezPath, _paint: &Paint) {}
    fn image(&mut self, _src: &str, _rect: kurbo::Rect) {}
    fn text(&mut self, _text: &str, _rect: kurbo::Rect, _size: f64, _align: TextAlign, _color: Color) {}
    fn scissor(&mut self, _region: kurbo::Rect, draw: &mut dyn FnMut(&mut Self)) {
        draw(self);
    }
}

/// Factory for [`NullSurface`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFactory;

impl SurfaceFactory for NullFactory {
    type Surface = NullSurface;

    fn create(&mut self, _tile: TileKey, _bounds: Rect, _scale: f64) -> NullSurface {
        NullSurface
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{DrawOp, RecordingSurface};
    use super::*;
    use crate::geometry::PressurePoint;
    use crate::items::Stroke;

    #[test]
    fn test_single_point_path_draws_dot() {
        let item = BoardItem::path(vec![PressurePoint::new(5.0, 5.0)], Stroke::new(0x11223344, 4.0)).unwrap();
        let mut s = RecordingSurface::default();
        paint_item(&mut s, &item);
        assert_eq!(s.ops, vec![DrawOp::Ellipse(0x11223344)]);
    }

    #[test]
    fn test_pressure_path_draws_per_segment() {
        let item = BoardItem::path(
            vec![
                PressurePoint::with_pressure(0.0, 0.0, 0.2),
                PressurePoint::with_pressure(5.0, 5.0, 0.6),
                PressurePoint::with_pressure(10.0, 0.0, 1.0),
            ],
            Stroke::default(),
        )
        .unwrap();
        let mut s = RecordingSurface::default();
        paint_item(&mut s, &item);
        assert_eq!(s.ops.len(), 2);
    }

    #[test]
    fn test_text_and_image_primitives() {
        let text = BoardItem::text(Rect::new(0.0, 0.0, 50.0, 20.0), "hi", 12.0, Stroke::default());
        let image = BoardItem::image(Rect::new(0.0, 0.0, 50.0, 20.0), "a.png");
        let mut s = RecordingSurface::default();
        paint_item(&mut s, &text);
        paint_item(&mut s, &image);
        assert_eq!(s.ops, vec![DrawOp::Text("hi".into()), DrawOp::Image("a.png".into())]);
    }
}
