//! RGBA tile surfaces.
//!
//! Coverage is decided per pixel center, with no anti-aliasing. That keeps
//! a partial repaint of a tile bit-identical to drawing it in one go.

use crate::images::ImageStore;
use image::{Rgba, RgbaImage};
use inkboard_core::chunks::TileKey;
use inkboard_core::geometry::Rect;
use inkboard_core::items::TextAlign;
use inkboard_core::surface::{Paint, Surface, SurfaceFactory};
use kurbo::{Affine, BezPath, Ellipse, PathEl, Point, Vec2};
use peniko::Color;
use std::sync::Arc;

/// Largest tile side in pixels. Chunks asked for more resolution than
/// this are drawn at the capped scale.
pub const DEFAULT_MAX_TILE_SIDE: u32 = 4096;

/// Flattening tolerance for curves, in pixels.
const FLATTEN_TOLERANCE: f64 = 0.25;

const PLACEHOLDER_FILL: [u8; 4] = [200, 200, 200, 255];
const PLACEHOLDER_LINE: [u8; 4] = [150, 150, 150, 255];

/// One chunk's pixels.
pub struct RasterSurface {
    pixels: RgbaImage,
    /// Board to pixel space.
    transform: Affine,
    scale: f64,
    /// Pixel-space clip stack; empty means the whole tile.
    clip: Vec<kurbo::Rect>,
    images: Arc<ImageStore>,
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("size", &self.pixels.dimensions())
            .field("scale", &self.scale)
            .finish()
    }
}

impl RasterSurface {
    /// A surface covering `bounds` at `scale` pixels per board unit.
    pub fn new(bounds: Rect, scale: f64, max_side: u32, images: Arc<ImageStore>) -> Self {
        let bounds = bounds.normalized();
        let extent = bounds.w().max(bounds.h()).max(f32::EPSILON) as f64;
        let wanted = (extent * scale).ceil();
        let side = wanted.clamp(1.0, max_side.max(1) as f64);
        if side < wanted {
            log::debug!("tile capped at {side}px (wanted {wanted}px)");
        }
        let scale = side / extent;
        let width = (bounds.w() as f64 * scale).ceil().max(1.0) as u32;
        let height = (bounds.h() as f64 * scale).ceil().max(1.0) as u32;
        Self {
            pixels: RgbaImage::new(width, height),
            transform: Affine::scale(scale) * Affine::translate((-(bounds.x as f64), -(bounds.y as f64))),
            scale,
            clip: Vec::new(),
            images,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// Effective pixels per board unit.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Pixel under a board point, if it lies on this tile.
    pub fn pixel_at(&self, board: Point) -> Option<Rgba<u8>> {
        let p = self.transform * board;
        if p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let (x, y) = (p.x as u32, p.y as u32);
        (x < self.width() && y < self.height()).then(|| *self.pixels.get_pixel(x, y))
    }

    fn full_rect(&self) -> kurbo::Rect {
        kurbo::Rect::new(0.0, 0.0, self.width() as f64, self.height() as f64)
    }

    fn current_clip(&self) -> kurbo::Rect {
        self.clip.last().copied().unwrap_or_else(|| self.full_rect())
    }

    fn to_pixels(&self, rect: kurbo::Rect) -> kurbo::Rect {
        self.transform.transform_rect_bbox(rect.abs())
    }

    /// Pixel index range covering `area` within the clip.
    fn span(&self, area: kurbo::Rect) -> Option<(u32, u32, u32, u32)> {
        let r = area.intersect(self.current_clip());
        if !r.is_finite() || r.x1 <= r.x0 || r.y1 <= r.y0 {
            return None;
        }
        let x0 = r.x0.floor().max(0.0) as u32;
        let y0 = r.y0.floor().max(0.0) as u32;
        let x1 = (r.x1.ceil() as u32).min(self.width());
        let y1 = (r.y1.ceil() as u32).min(self.height());
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    /// Blend `shade(center)` into every clipped pixel of `area`.
    fn shade(&mut self, area: kurbo::Rect, shade: impl Fn(Point) -> Option<[u8; 4]>) {
        let Some((x0, y0, x1, y1)) = self.span(area) else {
            return;
        };
        let clip = self.current_clip();
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if !clip.contains(center) {
                    continue;
                }
                if let Some(src) = shade(center) {
                    blend(self.pixels.get_pixel_mut(x, y), src);
                }
            }
        }
    }

    fn cover(&mut self, area: kurbo::Rect, color: [u8; 4], inside: impl Fn(Point) -> bool) {
        if color[3] == 0 {
            return;
        }
        self.shade(area, |p| inside(p).then_some(color));
    }

    /// Stroke flattened segments in pixel space. Each pixel is blended
    /// once even where segments overlap.
    fn stroke_segments(&mut self, segments: &[(Point, Point)], half_width: f64, color: [u8; 4]) {
        let Some(bbox) = segments
            .iter()
            .map(|(a, b)| kurbo::Rect::from_points(*a, *b))
            .reduce(|acc, r| acc.union(r))
        else {
            return;
        };
        let area = bbox.inflate(half_width, half_width);
        let Some((x0, y0, x1, y1)) = self.span(area) else {
            return;
        };
        let w = (x1 - x0) as usize;
        let mut mask = vec![false; w * (y1 - y0) as usize];
        for (a, b) in segments {
            let seg_area = kurbo::Rect::from_points(*a, *b).inflate(half_width, half_width);
            let Some((sx0, sy0, sx1, sy1)) = self.span(seg_area) else {
                continue;
            };
            for y in sy0..sy1 {
                for x in sx0..sx1 {
                    let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                    if segment_distance(center, *a, *b) <= half_width {
                        mask[(y - y0) as usize * w + (x - x0) as usize] = true;
                    }
                }
            }
        }
        self.cover(area, color, |p| {
            let (x, y) = (p.x as u32, p.y as u32);
            x >= x0 && y >= y0 && x < x1 && y < y1 && mask[(y - y0) as usize * w + (x - x0) as usize]
        });
    }

    fn placeholder(&mut self, dest: kurbo::Rect) {
        self.cover(dest, PLACEHOLDER_FILL, |p| dest.contains(p));
        let corners = [
            (Point::new(dest.x0, dest.y0), Point::new(dest.x1, dest.y1)),
            (Point::new(dest.x1, dest.y0), Point::new(dest.x0, dest.y1)),
        ];
        self.stroke_segments(&corners, self.scale.max(1.0), PLACEHOLDER_LINE);
    }
}

impl Surface for RasterSurface {
    fn clear(&mut self, color: Color) {
        let px = Rgba(rgba(color));
        for pixel in self.pixels.pixels_mut() {
            *pixel = px;
        }
    }

    fn fill_rect(&mut self, rect: kurbo::Rect, color: Color) {
        let area = self.to_pixels(rect);
        let Some((x0, y0, x1, y1)) = self.span(area) else {
            return;
        };
        let clip = self.current_clip();
        let px = Rgba(rgba(color));
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if clip.contains(center) && area.contains(center) {
                    self.pixels.put_pixel(x, y, px);
                }
            }
        }
    }

    fn rect(&mut self, rect: kurbo::Rect, paint: &Paint) {
        let r = self.to_pixels(rect);
        let hw = paint.width * self.scale * 0.5;
        let outer = r.inflate(hw, hw);
        let inner = r.inflate(-hw, -hw);
        let hollow = !paint.filled && inner.width() > 0.0 && inner.height() > 0.0;
        self.cover(outer, rgba(paint.color), |p| {
            outer.contains(p) && !(hollow && inner.contains(p))
        });
    }

    fn ellipse(&mut self, ellipse: Ellipse, paint: &Paint) {
        let center = self.transform * ellipse.center();
        let radii = ellipse.radii() * self.scale;
        let hw = paint.width * self.scale * 0.5;
        let (ox, oy) = (radii.x + hw, radii.y + hw);
        let (ix, iy) = (radii.x - hw, radii.y - hw);
        let hollow = !paint.filled && ix > 0.0 && iy > 0.0;
        let area = kurbo::Rect::from_center_size(center, (ox * 2.0, oy * 2.0));
        self.cover(area, rgba(paint.color), |p| {
            in_ellipse(p, center, ox, oy) && !(hollow && in_ellipse(p, center, ix, iy))
        });
    }

    fn path(&mut self, path: &BezPath, paint: &Paint) {
        let mut path = path.clone();
        path.apply_affine(self.transform);
        let mut segments = Vec::new();
        let mut start = None;
        let mut last = None;
        kurbo::flatten(path.iter(), FLATTEN_TOLERANCE, |el| match el {
            PathEl::MoveTo(p) => {
                start = Some(p);
                last = Some(p);
            }
            PathEl::LineTo(p) => {
                if let Some(a) = last {
                    segments.push((a, p));
                }
                last = Some(p);
            }
            PathEl::ClosePath => {
                if let (Some(a), Some(s)) = (last, start) {
                    segments.push((a, s));
                }
                last = start;
            }
            _ => {}
        });
        let half_width = (paint.width * self.scale * 0.5).max(0.5);
        self.stroke_segments(&segments, half_width, rgba(paint.color));
    }

    fn image(&mut self, src: &str, rect: kurbo::Rect) {
        let dest = self.to_pixels(rect);
        let Some(bitmap) = self.images.get(src) else {
            self.placeholder(dest);
            return;
        };
        let (iw, ih) = bitmap.dimensions();
        if iw == 0 || ih == 0 || dest.width() <= 0.0 || dest.height() <= 0.0 {
            return;
        }
        self.shade(dest, |p| {
            if !dest.contains(p) {
                return None;
            }
            let u = (((p.x - dest.x0) / dest.width()) * iw as f64) as u32;
            let v = (((p.y - dest.y0) / dest.height()) * ih as f64) as u32;
            Some(bitmap.get_pixel(u.min(iw - 1), v.min(ih - 1)).0)
        });
    }

    /// Text is drawn as one block per visible glyph.
    fn text(&mut self, text: &str, rect: kurbo::Rect, font_size: f64, alignment: TextAlign, color: Color) {
        let bounds = rect.abs();
        let size = font_size.max(1.0);
        let advance = size * 0.6;
        let glyph = Vec2::new(size * 0.5, size * 0.7);
        let line_height = size * 1.2;
        let color = rgba(color);

        for (row, line) in text.split('\n').enumerate() {
            let top = bounds.y0 + row as f64 * line_height + (line_height - glyph.y) * 0.5;
            if top >= bounds.y1 {
                break;
            }
            let width = line.chars().count() as f64 * advance;
            let left = match alignment {
                TextAlign::Left => bounds.x0,
                TextAlign::Center => bounds.x0 + (bounds.width() - width) * 0.5,
                TextAlign::Right => bounds.x1 - width,
            };
            for (i, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let cell = kurbo::Rect::from_origin_size((left + i as f64 * advance, top), (glyph.x, glyph.y))
                    .intersect(bounds);
                if cell.width() <= 0.0 || cell.height() <= 0.0 {
                    continue;
                }
                let area = self.to_pixels(cell);
                self.cover(area, color, |p| area.contains(p));
            }
        }
    }

    fn scissor(&mut self, region: kurbo::Rect, draw: &mut dyn FnMut(&mut Self)) {
        let clip = self.to_pixels(region).intersect(self.current_clip());
        self.clip.push(clip);
        draw(self);
        self.clip.pop();
    }
}

/// Creates [`RasterSurface`]s for chunks.
#[derive(Debug, Clone)]
pub struct RasterFactory {
    images: Arc<ImageStore>,
    max_side: u32,
}

impl Default for RasterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterFactory {
    pub fn new() -> Self {
        Self::with_images(Arc::new(ImageStore::new()))
    }

    pub fn with_images(images: Arc<ImageStore>) -> Self {
        Self {
            images,
            max_side: DEFAULT_MAX_TILE_SIDE,
        }
    }

    pub fn with_max_side(mut self, max_side: u32) -> Self {
        self.max_side = max_side.max(1);
        self
    }

    pub fn images(&self) -> &Arc<ImageStore> {
        &self.images
    }
}

impl SurfaceFactory for RasterFactory {
    type Surface = RasterSurface;

    fn create(&mut self, tile: TileKey, bounds: Rect, scale: f64) -> RasterSurface {
        log::trace!("allocating raster tile {tile} at scale {scale}");
        RasterSurface::new(bounds, scale, self.max_side, self.images.clone())
    }
}

pub(crate) fn rgba(color: Color) -> [u8; 4] {
    let c = color.to_rgba8();
    [c.r, c.g, c.b, c.a]
}

/// Source-over blend of a straight-alpha color.
fn blend(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let a = src[3] as u32;
    if a == 255 {
        *dst = Rgba(src);
        return;
    }
    let inv = 255 - a;
    for i in 0..3 {
        dst.0[i] = ((src[i] as u32 * a + dst.0[i] as u32 * inv + 127) / 255) as u8;
    }
    dst.0[3] = (a + (dst.0[3] as u32 * inv + 127) / 255).min(255) as u8;
}

fn in_ellipse(p: Point, center: Point, rx: f64, ry: f64) -> bool {
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let dx = (p.x - center.x) / rx;
    let dy = (p.y - center.y) / ry;
    dx * dx + dy * dy <= 1.0
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.hypot2();
    if len2 == 0.0 {
        return (p - a).hypot();
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).hypot()
}
