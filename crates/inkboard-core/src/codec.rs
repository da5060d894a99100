//! Binary encoding of board items.
//!
//! A blob is a plain concatenation of item records with no header or count;
//! the reader runs until the data is exhausted. All numbers are
//! little-endian. Record layout:
//!
//! ```text
//! u32  id
//! u8   type       0 path, 1 rectangle, 2 ellipse, 3 image, 4 text
//! u8   locked
//! u8   z_index
//! cstr label      NUL-terminated UTF-8, empty when the item has none
//! f32  x, y, x2, y2
//! path:      u32 color, u8 weight, u32 count, count * (f32 x, f32 y, f32 pressure)
//! rect/ell:  u32 color, u8 weight, u8 filled
//! image:     cstr src
//! text:      u32 color, u8 weight, f32 font_size, u8 alignment, cstr text
//! ```
//!
//! A pressure of `-1.0` means the point has none. A record that fails to
//! decode is skipped and decoding resumes right after the bytes it
//! consumed; a truncated tail ends decoding.

use crate::geometry::{PressurePoint, Rect};
use crate::items::{
    BoardItem, ImageItem, ItemId, ItemKind, ItemType, MAX_ITEM_ID, PathItem, ShapeItem, Stroke, TextAlign,
    TextItem, next_item_id, quantize_weight,
};
use thiserror::Error;

/// Decoding errors of a single record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("Unexpected end of data at offset {0}")]
    UnexpectedEof(usize),
    #[error("Unknown item type {tag} at offset {offset}")]
    UnknownType { tag: u8, offset: usize },
    #[error("Non-finite geometry in item {0}")]
    NonFinite(ItemId),
    #[error("Point count {count} exceeds the remaining data at offset {offset}")]
    PointCount { count: u32, offset: usize },
    #[error("Unknown text alignment {0}")]
    Alignment(u8),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// What to do with the ids stored in a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMode {
    /// Keep stored ids; used for loading and sync.
    #[default]
    Preserve,
    /// Give every decoded item a fresh id; used for paste.
    Regenerate,
}

const NO_PRESSURE: f32 = -1.0;
const POINT_SIZE: usize = 12;
const HEADER_SIZE: usize = 4 + 1 + 1 + 1 + 16;

/// Append-only little-endian writer over a preallocated buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// NUL-terminated string; interior NULs are dropped.
    pub fn cstr(&mut self, s: &str) {
        self.buf.extend(s.bytes().filter(|b| *b != 0));
        self.buf.push(0);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded blob.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// True once every byte has been consumed.
    pub fn eod(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Read up to the next NUL. Invalid UTF-8 is replaced, not rejected.
    pub fn cstr(&mut self) -> CodecResult<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let Some(end) = rest.iter().position(|b| *b == 0) else {
            return Err(CodecError::UnexpectedEof(self.data.len()));
        };
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }

    /// Step past a byte that could not start a record.
    fn skip(&mut self, from: usize) {
        if self.pos <= from {
            self.pos = from + 1;
        }
    }
}

fn cstr_size(s: &str) -> usize {
    s.bytes().filter(|b| *b != 0).count() + 1
}

/// Exact number of bytes `item` occupies when encoded.
pub fn serialized_size(item: &BoardItem) -> usize {
    let label = cstr_size(item.label.as_deref().unwrap_or(""));
    let body = match &item.kind {
        ItemKind::Path(p) => 4 + 1 + 4 + p.points.len() * POINT_SIZE,
        ItemKind::Rectangle(_) | ItemKind::Ellipse(_) => 4 + 1 + 1,
        ItemKind::Image(img) => cstr_size(&img.src),
        ItemKind::Text(t) => 4 + 1 + 4 + 1 + cstr_size(&t.text),
    };
    HEADER_SIZE + label + body
}

fn encodable(item: &BoardItem) -> bool {
    if item.id > MAX_ITEM_ID {
        log::warn!("item {} does not fit the record id field, not encoded", item.id);
        return false;
    }
    true
}

/// Encode items into one blob, in iteration order.
pub fn encode<'a, I>(items: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a BoardItem>,
{
    let items: Vec<&BoardItem> = items.into_iter().filter(|item| encodable(item)).collect();
    let size = items.iter().map(|item| serialized_size(item)).sum();
    let mut w = Writer::with_capacity(size);
    for item in items {
        write_item(&mut w, item);
    }
    debug_assert_eq!(w.len(), size);
    w.into_inner()
}

fn write_stroke(w: &mut Writer, stroke: &Stroke) {
    w.u32(stroke.color);
    w.u8(quantize_weight(stroke.weight) as u8);
}

/// Write one record. The id must already be known to fit in `u32`.
pub fn write_item(w: &mut Writer, item: &BoardItem) {
    w.u32(item.id as u32);
    w.u8(item.item_type() as u8);
    w.u8(item.locked as u8);
    w.u8(item.z_index);
    w.cstr(item.label.as_deref().unwrap_or(""));
    for v in [item.rect.x, item.rect.y, item.rect.x2, item.rect.y2] {
        w.f32(v);
    }
    match &item.kind {
        ItemKind::Path(p) => {
            write_stroke(w, &p.stroke);
            w.u32(p.points.len() as u32);
            for pt in &p.points {
                w.f32(pt.x);
                w.f32(pt.y);
                w.f32(pt.pressure.unwrap_or(NO_PRESSURE));
            }
        }
        ItemKind::Rectangle(s) | ItemKind::Ellipse(s) => {
            write_stroke(w, &s.stroke);
            w.u8(s.filled as u8);
        }
        ItemKind::Image(img) => w.cstr(&img.src),
        ItemKind::Text(t) => {
            write_stroke(w, &t.stroke);
            w.f32(t.font_size);
            w.u8(t.alignment as u8);
            w.cstr(&t.text);
        }
    }
}

fn read_stroke(r: &mut Reader<'_>) -> CodecResult<Stroke> {
    let color = r.u32()?;
    let weight = r.u8()? as f32;
    Ok(Stroke { color, weight })
}

/// Read one record starting at the reader's cursor.
pub fn read_item(r: &mut Reader<'_>, mode: IdMode) -> CodecResult<BoardItem> {
    let offset = r.position();
    let id = r.u32()? as ItemId;
    let tag = r.u8()?;
    let item_type = ItemType::try_from(tag).map_err(|tag| CodecError::UnknownType { tag, offset })?;
    let locked = r.u8()? != 0;
    let z_index = r.u8()?;
    let label = r.cstr()?;
    let rect = Rect::new(r.f32()?, r.f32()?, r.f32()?, r.f32()?);

    let kind = match item_type {
        ItemType::Path => {
            let stroke = read_stroke(r)?;
            let count = r.u32()?;
            if count as usize > r.remaining() / POINT_SIZE {
                return Err(CodecError::PointCount { count, offset });
            }
            let mut points = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (x, y, pressure) = (r.f32()?, r.f32()?, r.f32()?);
                if !(x.is_finite() && y.is_finite()) {
                    return Err(CodecError::NonFinite(id));
                }
                let pressure = (pressure.is_finite() && pressure >= 0.0).then(|| pressure.min(1.0));
                points.push(PressurePoint { x, y, pressure });
            }
            ItemKind::Path(PathItem { stroke, points })
        }
        ItemType::Rectangle | ItemType::Ellipse => {
            let stroke = read_stroke(r)?;
            let filled = r.u8()? != 0;
            let shape = ShapeItem { stroke, filled };
            if item_type == ItemType::Rectangle {
                ItemKind::Rectangle(shape)
            } else {
                ItemKind::Ellipse(shape)
            }
        }
        ItemType::Image => ItemKind::Image(ImageItem { src: r.cstr()? }),
        ItemType::Text => {
            let stroke = read_stroke(r)?;
            let font_size = r.f32()?;
            let alignment = TextAlign::try_from(r.u8()?).map_err(CodecError::Alignment)?;
            let text = r.cstr()?;
            if !font_size.is_finite() {
                return Err(CodecError::NonFinite(id));
            }
            ItemKind::Text(TextItem {
                stroke,
                font_size,
                alignment,
                text,
            })
        }
    };

    if !rect.is_finite() {
        return Err(CodecError::NonFinite(id));
    }

    let mut item = BoardItem {
        id,
        rect,
        z_index,
        locked,
        label: None,
        kind,
    };
    item.set_label(Some(label));
    if mode == IdMode::Regenerate {
        item.id = next_item_id();
    }
    Ok(item)
}

/// Outcome of a tolerant decode.
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub items: Vec<BoardItem>,
    /// Offset and reason of every record that was dropped.
    pub skipped: Vec<(usize, CodecError)>,
    /// True when the blob ended inside a record.
    pub truncated: bool,
}

/// Decode every readable record, reporting what was dropped.
pub fn decode_with_report(data: &[u8], mode: IdMode) -> DecodeReport {
    let mut report = DecodeReport::default();
    let mut r = Reader::new(data);
    while !r.eod() {
        let start = r.position();
        match read_item(&mut r, mode) {
            Ok(item) => report.items.push(item),
            Err(err @ CodecError::UnexpectedEof(_)) => {
                log::warn!("truncated record at offset {start}: {err}");
                report.skipped.push((start, err));
                report.truncated = true;
                break;
            }
            Err(err) => {
                log::warn!("skipping record at offset {start}: {err}");
                report.skipped.push((start, err));
                r.skip(start);
            }
        }
    }
    report
}

/// Decode every readable record; failures are logged and skipped.
pub fn decode(data: &[u8], mode: IdMode) -> Vec<BoardItem> {
    decode_with_report(data, mode).items
}
