//! Board item definitions.

mod image;
mod path;
mod shape;
mod text;

pub use image::ImageItem;
pub use path::PathItem;
pub use shape::ShapeItem;
pub use text::{TextAlign, TextItem};

use crate::geometry::{Point, Rect};
use peniko::Color;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Unique identifier for board items.
///
/// Ids are drawn from the 32-bit range because the binary record stores
/// them as `u32`.
pub type ItemId = u64;

/// Largest id the binary record can hold.
pub const MAX_ITEM_ID: ItemId = u32::MAX as ItemId;

/// Generate a random, non-zero item id.
pub fn next_item_id() -> ItemId {
    let raw = Uuid::new_v4().as_u128() as u32;
    raw.max(1) as ItemId
}

/// Type tag of an item, as stored in the binary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ItemType {
    Path = 0,
    Rectangle = 1,
    Ellipse = 2,
    Image = 3,
    Text = 4,
}

impl TryFrom<u8> for ItemType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ItemType::Path),
            1 => Ok(ItemType::Rectangle),
            2 => Ok(ItemType::Ellipse),
            3 => Ok(ItemType::Image),
            4 => Ok(ItemType::Text),
            other => Err(other),
        }
    }
}

/// Color and stroke weight shared by every shape-like item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Packed `0xRRGGBBAA`.
    pub color: u32,
    /// Stroke width in board units. The binary record keeps whole units only.
    #[serde(deserialize_with = "deserialize_weight")]
    pub weight: f32,
}

fn deserialize_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    f32::deserialize(deserializer).map(quantize_weight)
}

impl Stroke {
    pub const BLACK: u32 = 0x0000_00FF;

    pub fn new(color: u32, weight: f32) -> Self {
        Self {
            color,
            weight: quantize_weight(weight),
        }
    }

    /// Unpack the RGBA color for rendering.
    pub fn color(&self) -> Color {
        let [r, g, b, a] = self.color.to_be_bytes();
        Color::from_rgba8(r, g, b, a)
    }
}

impl Default for Stroke {
    fn default() -> Self {
        Self::new(Self::BLACK, 2.0)
    }
}

/// Clamp a weight into what a `u8` record field can hold.
pub fn quantize_weight(weight: f32) -> f32 {
    if weight.is_finite() {
        weight.round().clamp(0.0, 255.0)
    } else {
        0.0
    }
}

/// Variant-specific payload of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Path(PathItem),
    Rectangle(ShapeItem),
    Ellipse(ShapeItem),
    Image(ImageItem),
    Text(TextItem),
}

/// A drawable entity on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: ItemId,
    /// Placement of the item. Path points are relative to this rect.
    pub rect: Rect,
    #[serde(default)]
    pub z_index: u8,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: ItemKind,
}

impl BoardItem {
    /// Wrap a payload with a fresh id.
    pub fn new(rect: Rect, kind: ItemKind) -> Self {
        Self {
            id: next_item_id(),
            rect,
            z_index: 0,
            locked: false,
            label: None,
            kind,
        }
    }

    /// A freehand stroke from absolute points.
    pub fn path(points: Vec<crate::geometry::PressurePoint>, stroke: Stroke) -> Option<Self> {
        let (path, rect) = PathItem::from_absolute(points, stroke)?;
        Some(Self::new(rect, ItemKind::Path(path)))
    }

    pub fn rectangle(rect: Rect, stroke: Stroke, filled: bool) -> Self {
        Self::new(rect.normalized(), ItemKind::Rectangle(ShapeItem { stroke, filled }))
    }

    pub fn ellipse(rect: Rect, stroke: Stroke, filled: bool) -> Self {
        Self::new(rect.normalized(), ItemKind::Ellipse(ShapeItem { stroke, filled }))
    }

    pub fn image(rect: Rect, src: impl Into<String>) -> Self {
        Self::new(rect.normalized(), ItemKind::Image(ImageItem { src: src.into() }))
    }

    pub fn text(rect: Rect, text: impl Into<String>, font_size: f32, stroke: Stroke) -> Self {
        Self::new(
            rect.normalized(),
            ItemKind::Text(TextItem {
                stroke,
                font_size,
                alignment: TextAlign::default(),
                text: text.into(),
            }),
        )
    }

    pub fn with_z_index(mut self, z_index: u8) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.set_label(Some(label.into()));
        self
    }

    pub fn item_type(&self) -> ItemType {
        match self.kind {
            ItemKind::Path(_) => ItemType::Path,
            ItemKind::Rectangle(_) => ItemType::Rectangle,
            ItemKind::Ellipse(_) => ItemType::Ellipse,
            ItemKind::Image(_) => ItemType::Image,
            ItemKind::Text(_) => ItemType::Text,
        }
    }

    /// Bounding box used by the spatial index.
    pub fn bounds(&self) -> Rect {
        self.rect.normalized()
    }

    /// Stroke for shape-like items; images have none.
    pub fn stroke(&self) -> Option<&Stroke> {
        match &self.kind {
            ItemKind::Path(p) => Some(&p.stroke),
            ItemKind::Rectangle(s) | ItemKind::Ellipse(s) => Some(&s.stroke),
            ItemKind::Text(t) => Some(&t.stroke),
            ItemKind::Image(_) => None,
        }
    }

    pub fn stroke_mut(&mut self) -> Option<&mut Stroke> {
        match &mut self.kind {
            ItemKind::Path(p) => Some(&mut p.stroke),
            ItemKind::Rectangle(s) | ItemKind::Ellipse(s) => Some(&mut s.stroke),
            ItemKind::Text(t) => Some(&mut t.stroke),
            ItemKind::Image(_) => None,
        }
    }

    /// Returns false for items without a stroke.
    pub fn set_color(&mut self, color: u32) -> bool {
        match self.stroke_mut() {
            Some(stroke) => {
                stroke.color = color;
                true
            }
            None => false,
        }
    }

    /// Returns false for items without a stroke.
    pub fn set_weight(&mut self, weight: f32) -> bool {
        match self.stroke_mut() {
            Some(stroke) => {
                stroke.weight = quantize_weight(weight);
                true
            }
            None => false,
        }
    }

    /// Empty labels are stored as no label.
    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label.filter(|l| !l.is_empty());
    }

    /// Returns false for non-text items.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        match &mut self.kind {
            ItemKind::Text(t) => {
                t.text = text.into();
                true
            }
            _ => false,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.rect.translate(dx, dy);
    }

    /// Replace the id, used when pasting copies next to their originals.
    pub fn regenerate_id(&mut self) {
        self.id = next_item_id();
    }

    /// Check if a point hits this item, with `tolerance` in board units.
    pub fn hit_test(&self, point: Point, tolerance: f32) -> bool {
        if !self.bounds().inflate(tolerance, tolerance).contains(point) {
            return false;
        }
        match &self.kind {
            ItemKind::Path(p) => p.hit_test(&self.rect, point, tolerance),
            ItemKind::Rectangle(s) => s.hit_test_rect(&self.rect, point, tolerance),
            ItemKind::Ellipse(s) => s.hit_test_ellipse(&self.rect, point, tolerance),
            ItemKind::Image(_) | ItemKind::Text(_) => true,
        }
    }
}

/// Distance from a point to a line segment (a to b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f32 {
    let (sx, sy) = (b.x - a.x, b.y - a.y);
    let (px, py) = (point.x - a.x, point.y - a.y);
    let len_sq = sx * sx + sy * sy;
    if len_sq < f32::EPSILON {
        return (px * px + py * py).sqrt();
    }
    let t = ((px * sx + py * sy) / len_sq).clamp(0.0, 1.0);
    let (dx, dy) = (point.x - (a.x + t * sx), point.y - (a.y + t * sy));
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PressurePoint;

    #[test]
    fn test_ids_fit_record_field() {
        for _ in 0..64 {
            let id = next_item_id();
            assert!(id >= 1 && id <= u32::MAX as u64);
        }
    }

    #[test]
    fn test_item_type_tags() {
        assert_eq!(ItemType::try_from(3), Ok(ItemType::Image));
        assert_eq!(ItemType::try_from(9), Err(9));
        let ellipse = BoardItem::ellipse(Rect::new(0.0, 0.0, 1.0, 1.0), Stroke::default(), false);
        assert_eq!(ellipse.item_type(), ItemType::Ellipse);
    }

    #[test]
    fn test_stroke_color_unpacks_rgba() {
        let stroke = Stroke::new(0xFF00_80FF, 2.0);
        let rgba = stroke.color().to_rgba8();
        assert_eq!((rgba.r, rgba.g, rgba.b, rgba.a), (255, 0, 128, 255));
    }

    #[test]
    fn test_weight_quantized() {
        assert_eq!(Stroke::new(0, 2.4).weight, 2.0);
        assert_eq!(Stroke::new(0, 900.0).weight, 255.0);
        assert_eq!(Stroke::new(0, f32::NAN).weight, 0.0);
    }

    #[test]
    fn test_weight_quantized_when_deserialized() {
        let stroke: Stroke = serde_json::from_str(r#"{"color": 255, "weight": 2.5}"#).unwrap();
        assert_eq!(stroke.weight, 3.0);
        let stroke: Stroke = serde_json::from_str(r#"{"color": 255, "weight": -4}"#).unwrap();
        assert_eq!(stroke.weight, 0.0);
    }

    #[test]
    fn test_image_has_no_stroke() {
        let mut img = BoardItem::image(Rect::new(0.0, 0.0, 10.0, 10.0), "cat.png");
        assert!(img.stroke().is_none());
        assert!(!img.set_color(0xFFFFFFFF));
        assert!(!img.set_weight(4.0));
    }

    #[test]
    fn test_empty_label_is_none() {
        let mut item = BoardItem::rectangle(Rect::new(0.0, 0.0, 10.0, 10.0), Stroke::default(), true);
        item.set_label(Some(String::new()));
        assert_eq!(item.label, None);
        item.set_label(Some("todo".into()));
        assert_eq!(item.label.as_deref(), Some("todo"));
    }

    #[test]
    fn test_json_carries_declared_type() {
        let item = BoardItem::path(
            vec![PressurePoint::new(0.0, 0.0), PressurePoint::with_pressure(10.0, 5.0, 0.5)],
            Stroke::default(),
        )
        .unwrap()
        .with_label("stroke");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "path");
        let back: BoardItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_hit_test_filled_rectangle() {
        let item = BoardItem::rectangle(Rect::new(0.0, 0.0, 100.0, 100.0), Stroke::default(), true);
        assert!(item.hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(item.hit_test(Point::new(104.0, 50.0), 5.0));
        assert!(!item.hit_test(Point::new(150.0, 50.0), 0.0));
    }

    #[test]
    fn test_segment_distance() {
        let d = point_to_segment_dist(Point::new(5.0, 3.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 3.0).abs() < 1e-6);
    }
}
