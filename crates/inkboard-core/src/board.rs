//! The board: item table plus the chunks that index and draw it.
//!
//! Every mutation here is a plain primitive. It changes the table, keeps
//! the chunks in step and reports what it overwrote, but it knows nothing
//! about history, the network or persistence.

use crate::chunks::{ChunkManager, RebuildStatus};
use crate::codec::{self, DecodeReport, IdMode};
use crate::config::EngineConfig;
use crate::geometry::{Point, Rect};
use crate::items::{BoardItem, ItemId, MAX_ITEM_ID};
use crate::surface::SurfaceFactory;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Slot {
    item: BoardItem,
    seq: u64,
}

/// Owner of every item, keyed by id.
///
/// Each entry remembers when it was inserted so that items sharing a
/// z-index paint in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ItemTable {
    slots: HashMap<ItemId, Slot>,
    next_seq: u64,
}

impl ItemTable {
    /// Insert or replace an item. A replaced item sorts as newly inserted.
    pub fn insert(&mut self, item: BoardItem) -> Option<BoardItem> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(item.id, Slot { item, seq }).map(|slot| slot.item)
    }

    /// Insert an item at an insertion position it held before, so it sorts
    /// where it used to among items of the same z-index.
    pub fn insert_at(&mut self, item: BoardItem, seq: u64) -> Option<BoardItem> {
        self.next_seq = self.next_seq.max(seq + 1);
        self.slots.insert(item.id, Slot { item, seq }).map(|slot| slot.item)
    }

    /// Insertion position of an item.
    pub fn seq(&self, id: ItemId) -> Option<u64> {
        self.slots.get(&id).map(|slot| slot.seq)
    }

    pub fn remove(&mut self, id: ItemId) -> Option<BoardItem> {
        self.slots.remove(&id).map(|slot| slot.item)
    }

    pub fn get(&self, id: ItemId) -> Option<&BoardItem> {
        self.slots.get(&id).map(|slot| &slot.item)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut BoardItem> {
        self.slots.get_mut(&id).map(|slot| &mut slot.item)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Paint order key: z-index first, insertion order second.
    pub fn order_key(&self, id: ItemId) -> Option<(u8, u64)> {
        self.slots.get(&id).map(|slot| (slot.item.z_index, slot.seq))
    }

    /// Items in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &BoardItem> {
        self.slots.values().map(|slot| &slot.item)
    }

    /// Every id, bottom-most first.
    pub fn ids_in_paint_order(&self) -> Vec<ItemId> {
        let mut keyed: Vec<_> = self
            .slots
            .iter()
            .map(|(id, slot)| ((slot.item.z_index, slot.seq), *id))
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, id)| id).collect()
    }

    /// Every item, bottom-most first.
    pub fn in_paint_order(&self) -> Vec<&BoardItem> {
        self.ids_in_paint_order()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }
}

/// Items plus their spatial index and rendered tiles.
pub struct Board<F: SurfaceFactory> {
    items: ItemTable,
    chunks: ChunkManager<F>,
}

impl<F: SurfaceFactory> std::fmt::Debug for Board<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("items", &self.items.len())
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl<F: SurfaceFactory> Board<F> {
    pub fn new(factory: F, config: &EngineConfig) -> Self {
        Self {
            items: ItemTable::default(),
            chunks: ChunkManager::new(factory, config),
        }
    }

    pub fn items(&self) -> &ItemTable {
        &self.items
    }

    pub fn chunks(&self) -> &ChunkManager<F> {
        &self.chunks
    }

    pub fn get(&self, id: ItemId) -> Option<&BoardItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `bounds` is a place an item may occupy: finite and within
    /// the per-item tile limit. Refusals are logged.
    fn placeable(&self, id: ItemId, bounds: &Rect) -> bool {
        if !bounds.is_finite() {
            log::warn!("refusing item {id} with non-finite bounds");
            return false;
        }
        if !self.chunks.fits(bounds) {
            log::warn!(
                "refusing item {id}: {}x{} covers more than {} tiles",
                bounds.w(),
                bounds.h(),
                self.chunks.layout().max_item_tiles
            );
            return false;
        }
        true
    }

    /// Whether `item` can be held by this board. Its id must fit the binary
    /// record and its bounds must be placeable, otherwise it could neither
    /// be saved nor drawn.
    pub fn accepts(&self, item: &BoardItem) -> bool {
        if item.id > MAX_ITEM_ID {
            log::warn!("refusing item {}: id exceeds {MAX_ITEM_ID}", item.id);
            return false;
        }
        self.placeable(item.id, &item.bounds())
    }

    /// Insert items, replacing any with the same id. Items the board does
    /// not [`accept`](Board::accepts) are dropped. Returns the ids actually
    /// added.
    pub fn add_items(&mut self, items: Vec<BoardItem>) -> Vec<ItemId> {
        items.into_iter().filter_map(|item| self.place(item, None)).collect()
    }

    /// Re-insert previously removed items at their old insertion positions.
    pub fn restore_items(&mut self, items: Vec<(BoardItem, u64)>) -> Vec<ItemId> {
        items
            .into_iter()
            .filter_map(|(item, seq)| self.place(item, Some(seq)))
            .collect()
    }

    fn place(&mut self, item: BoardItem, seq: Option<u64>) -> Option<ItemId> {
        if !self.accepts(&item) {
            return None;
        }
        let id = item.id;
        let replaced = match seq {
            Some(seq) => self.items.insert_at(item, seq),
            None => self.items.insert(item),
        };
        if let Some(old) = replaced {
            self.chunks.remove_from_chunk(&[(id, old.bounds())], &self.items);
        }
        self.chunks.add_to_chunk(self.items.get(id), &self.items);
        Some(id)
    }

    /// Remove items. Returns the removed items in the order given.
    pub fn remove_by_ids(&mut self, ids: &[ItemId]) -> Vec<BoardItem> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.items.remove(*id) {
                self.chunks.remove_from_chunk(&[(*id, item.bounds())], &self.items);
                removed.push(item);
            }
        }
        removed
    }

    /// Apply `f` to an item and reindex it. Returns `f`'s result.
    fn modify<R>(&mut self, id: ItemId, f: impl FnOnce(&mut BoardItem) -> R) -> Option<R> {
        let item = self.items.get_mut(id)?;
        let old = item.bounds();
        let out = f(item);
        if let Some(item) = self.items.get(id) {
            self.chunks.update(item, &old, &self.items);
        }
        Some(out)
    }

    /// Translate items. Returns the ids moved; items that would end up
    /// unplaceable stay where they are.
    pub fn move_items(&mut self, ids: &[ItemId], dx: f32, dy: f32) -> Vec<ItemId> {
        if !(dx.is_finite() && dy.is_finite()) {
            return Vec::new();
        }
        let movable: Vec<ItemId> = ids
            .iter()
            .copied()
            .filter(|id| {
                self.items
                    .get(*id)
                    .is_some_and(|item| self.placeable(*id, &item.bounds().translated(dx, dy)))
            })
            .collect();
        movable
            .into_iter()
            .filter_map(|id| self.modify(id, |item| item.translate(dx, dy)).map(|_| id))
            .collect()
    }

    /// Set absolute rects. Returns the previous rect of every item touched.
    pub fn resize_items(&mut self, rects: &[(ItemId, Rect)]) -> Vec<(ItemId, Rect)> {
        let resizable: Vec<(ItemId, Rect)> = rects
            .iter()
            .copied()
            .filter(|(id, rect)| self.items.contains(*id) && self.placeable(*id, &rect.normalized()))
            .collect();
        resizable
            .into_iter()
            .filter_map(|(id, rect)| {
                self.modify(id, |item| std::mem::replace(&mut item.rect, rect))
                    .map(|old| (id, old))
            })
            .collect()
    }

    /// Shift z-indices by `step`, saturating at the `u8` range. Returns the
    /// previous z of every item touched.
    pub fn reorder(&mut self, ids: &[ItemId], step: i16) -> Vec<(ItemId, u8)> {
        ids.iter()
            .filter_map(|id| {
                self.modify(*id, |item| {
                    let old = item.z_index;
                    item.z_index = (old as i16 + step).clamp(0, u8::MAX as i16) as u8;
                    old
                })
                .map(|old| (*id, old))
            })
            .collect()
    }

    /// Set exact z-indices.
    pub fn set_z_values(&mut self, values: &[(ItemId, u8)]) {
        for (id, z) in values {
            self.modify(*id, |item| item.z_index = *z);
        }
    }

    /// Locking has no visual effect, so nothing is repainted.
    pub fn set_locked(&mut self, ids: &[ItemId], locked: bool) -> Vec<(ItemId, bool)> {
        ids.iter()
            .filter_map(|id| {
                let item = self.items.get_mut(*id)?;
                Some((*id, std::mem::replace(&mut item.locked, locked)))
            })
            .collect()
    }

    /// Labels have no visual effect, so nothing is repainted.
    pub fn set_label(&mut self, ids: &[ItemId], label: Option<&str>) -> Vec<(ItemId, Option<String>)> {
        ids.iter()
            .filter_map(|id| {
                let item = self.items.get_mut(*id)?;
                let old = item.label.take();
                item.set_label(label.map(str::to_owned));
                Some((*id, old))
            })
            .collect()
    }

    /// Recolor stroked items. Items without a stroke are skipped.
    pub fn set_color(&mut self, ids: &[ItemId], color: u32) -> Vec<(ItemId, u32)> {
        ids.iter()
            .filter_map(|id| {
                let old = self.items.get(*id)?.stroke()?.color;
                self.modify(*id, |item| item.set_color(color));
                Some((*id, old))
            })
            .collect()
    }

    /// Change stroke weight. Items without a stroke are skipped.
    pub fn set_weight(&mut self, ids: &[ItemId], weight: f32) -> Vec<(ItemId, f32)> {
        ids.iter()
            .filter_map(|id| {
                let old = self.items.get(*id)?.stroke()?.weight;
                self.modify(*id, |item| item.set_weight(weight));
                Some((*id, old))
            })
            .collect()
    }

    /// Replace the text of a text item. Returns the previous text.
    pub fn set_text(&mut self, id: ItemId, text: &str) -> Option<String> {
        let old = self.items.get(id)?.text_content()?.to_owned();
        self.modify(id, |item| item.set_text(text));
        Some(old)
    }

    /// Items whose bounds intersect `region`, bottom-most first.
    pub fn get_items_within_rect(&self, region: &Rect) -> Vec<&BoardItem> {
        let mut found: Vec<&BoardItem> = self
            .chunks
            .items_within(region)
            .into_iter()
            .filter_map(|id| self.items.get(id))
            .collect();
        found.sort_by_key(|item| self.items.order_key(item.id));
        found
    }

    /// Items under `point`, front-most first.
    pub fn items_at_point(&self, point: Point, tolerance: f32) -> Vec<ItemId> {
        let hit_area = Rect::from_points(point, point).inflate(tolerance, tolerance);
        let mut hits: Vec<ItemId> = self
            .get_items_within_rect(&hit_area)
            .into_iter()
            .filter(|item| item.hit_test(point, tolerance))
            .map(|item| item.id)
            .collect();
        hits.reverse();
        hits
    }

    /// Bounds of all content, if any.
    pub fn content_bounds(&self) -> Option<Rect> {
        let mut iter = self.items.iter().map(BoardItem::bounds);
        let first = iter.next()?;
        Some(iter.fold(first, |acc, b| acc.union(&b)))
    }

    /// Replace every item with the contents of a blob.
    pub fn load_contents(&mut self, data: &[u8]) -> DecodeReport {
        let report = codec::decode_with_report(data, IdMode::Preserve);
        self.items.clear();
        for item in &report.items {
            if self.accepts(item) {
                self.items.insert(item.clone());
            }
        }
        self.chunks.rebuild(&self.items);
        log::debug!(
            "loaded {} items ({} records skipped)",
            self.items.len(),
            report.skipped.len()
        );
        report
    }

    /// Encode the given items, or every item, bottom-most first.
    pub fn serialize(&self, ids: Option<&[ItemId]>) -> Vec<u8> {
        match ids {
            Some(ids) => {
                let mut items: Vec<&BoardItem> = ids.iter().filter_map(|id| self.items.get(*id)).collect();
                items.sort_by_key(|item| self.items.order_key(item.id));
                codec::encode(items)
            }
            None => codec::encode(self.items.in_paint_order()),
        }
    }

    /// Redraw `region` of every chunk it touches.
    pub fn repaint(&mut self, region: &Rect) {
        self.chunks.repaint(region, &self.items);
    }

    /// Clear and redraw every chunk now.
    pub fn rebuild(&mut self) {
        self.chunks.rebuild(&self.items);
    }

    /// Request chunks at a new resolution; the work happens in [`tick`].
    ///
    /// [`tick`]: Board::tick
    pub fn set_scale(&mut self, scale: f64) {
        if !(scale.is_finite() && scale > 0.0) {
            return;
        }
        let target = self.chunks.pending_scale().unwrap_or(self.chunks.scale());
        if target == scale {
            return;
        }
        if scale == self.chunks.scale() {
            // Back to the live resolution before the rebuild finished.
            self.chunks.cancel_rebuild();
            return;
        }
        self.chunks.begin_rebuild(scale, &self.items);
    }

    /// Advance any asynchronous rebuild by one batch.
    pub fn tick(&mut self) -> RebuildStatus {
        self.chunks.tick(&self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PressurePoint;
    use crate::items::Stroke;
    use crate::surface::NullFactory;

    fn board() -> Board<NullFactory> {
        Board::new(NullFactory, &EngineConfig::default())
    }

    fn rect(id: ItemId, r: Rect) -> BoardItem {
        let mut item = BoardItem::rectangle(r, Stroke::default(), true);
        item.id = id;
        item
    }

    #[test]
    fn test_add_query_remove() {
        let mut b = board();
        b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 10.0, 10.0)), rect(2, Rect::new(500.0, 500.0, 510.0, 510.0))]);
        let hits: Vec<_> = b.get_items_within_rect(&Rect::new(0.0, 0.0, 20.0, 20.0)).iter().map(|i| i.id).collect();
        assert_eq!(hits, vec![1]);
        assert_eq!(b.remove_by_ids(&[1, 99]).len(), 1);
        assert!(b.get_items_within_rect(&Rect::new(0.0, 0.0, 20.0, 20.0)).is_empty());
    }

    #[test]
    fn test_add_replaces_same_id() {
        let mut b = board();
        b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 10.0, 10.0))]);
        b.add_items(vec![rect(1, Rect::new(3000.0, 0.0, 3010.0, 10.0))]);
        assert_eq!(b.len(), 1);
        assert!(b.get_items_within_rect(&Rect::new(0.0, 0.0, 20.0, 20.0)).is_empty());
    }

    #[test]
    fn test_non_finite_item_dropped() {
        let mut b = board();
        let added = b.add_items(vec![rect(1, Rect::new(0.0, 0.0, f32::INFINITY, 10.0))]);
        assert!(added.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_move_and_resize_reindex() {
        let mut b = board();
        b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 10.0, 10.0))]);
        assert_eq!(b.move_items(&[1, 5], 5.0, -3.0), vec![1]);
        assert_eq!(b.get(1).unwrap().rect, Rect::new(5.0, -3.0, 15.0, 7.0));
        let old = b.resize_items(&[(1, Rect::new(100.0, 100.0, 200.0, 200.0))]);
        assert_eq!(old, vec![(1, Rect::new(5.0, -3.0, 15.0, 7.0))]);
        assert_eq!(b.get_items_within_rect(&Rect::new(150.0, 150.0, 150.0, 150.0)).len(), 1);
    }

    #[test]
    fn test_reorder_saturates() {
        let mut b = board();
        b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 1.0, 1.0)).with_z_index(250)]);
        assert_eq!(b.reorder(&[1], 10), vec![(1, 250)]);
        assert_eq!(b.get(1).unwrap().z_index, 255);
        b.reorder(&[1], -300);
        assert_eq!(b.get(1).unwrap().z_index, 0);
    }

    #[test]
    fn test_style_setters_report_previous_values() {
        let mut b = board();
        b.add_items(vec![
            rect(1, Rect::new(0.0, 0.0, 1.0, 1.0)),
            {
                let mut img = BoardItem::image(Rect::new(0.0, 0.0, 1.0, 1.0), "x.png");
                img.id = 2;
                img
            },
        ]);
        assert_eq!(b.set_color(&[1, 2], 0x123456FF), vec![(1, Stroke::BLACK)]);
        assert_eq!(b.set_weight(&[1], 9.0), vec![(1, 2.0)]);
        assert_eq!(b.set_locked(&[1], true), vec![(1, false)]);
        assert_eq!(b.set_label(&[1], Some("a")), vec![(1, None)]);
        assert_eq!(b.set_label(&[1], Some("")), vec![(1, Some("a".into()))]);
        assert_eq!(b.get(1).unwrap().label, None);
        assert_eq!(b.set_text(1, "nope"), None);
    }

    #[test]
    fn test_items_at_point_front_most_first() {
        let mut b = board();
        b.add_items(vec![
            rect(1, Rect::new(0.0, 0.0, 50.0, 50.0)).with_z_index(2),
            rect(2, Rect::new(10.0, 10.0, 60.0, 60.0)).with_z_index(1),
            rect(3, Rect::new(200.0, 200.0, 210.0, 210.0)),
        ]);
        assert_eq!(b.items_at_point(Point::new(20.0, 20.0), 1.0), vec![1, 2]);
    }

    #[test]
    fn test_serialize_and_load_round_trip() {
        let mut b = board();
        let path = BoardItem::path(
            vec![PressurePoint::new(0.0, 0.0), PressurePoint::new(20.0, 20.0)],
            Stroke::default(),
        )
        .unwrap();
        let path_id = path.id;
        b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 10.0, 10.0)), path]);
        let bytes = b.serialize(None);

        let mut other = board();
        let report = other.load_contents(&bytes);
        assert_eq!(report.items.len(), 2);
        assert_eq!(other.get(path_id), b.get(path_id));
        assert_eq!(other.get(1), b.get(1));
        assert_eq!(other.serialize(Some(&[1])), b.serialize(Some(&[1])));
    }

    #[test]
    fn test_three_point_path_found_in_first_tile_then_removed() {
        let mut b = board();
        let mut path = BoardItem::path(
            vec![
                PressurePoint::new(100.0, 100.0),
                PressurePoint::new(150.0, 180.0),
                PressurePoint::new(220.0, 130.0),
            ],
            Stroke::default(),
        )
        .unwrap();
        path.id = 1;
        b.add_items(vec![path]);
        assert_eq!(b.chunks().chunk_count(), 1);
        let region = Rect::new(0.0, 0.0, 2000.0, 2000.0);
        let hits: Vec<_> = b.get_items_within_rect(&region).iter().map(|i| i.id).collect();
        assert_eq!(hits, vec![1]);

        assert_eq!(b.remove_by_ids(&[1]).len(), 1);
        assert!(b.get_items_within_rect(&region).is_empty());
    }

    #[test]
    fn test_item_covering_too_many_tiles_refused() {
        let mut b = board();
        let added = b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 1.0e6, 1.0e6))]);
        assert!(added.is_empty());
        assert!(b.is_empty());
        assert_eq!(b.chunks().chunk_count(), 0);

        // 8x8 tiles is exactly the default limit.
        assert_eq!(b.add_items(vec![rect(2, Rect::new(0.0, 0.0, 15000.0, 15000.0))]), vec![2]);
        assert_eq!(b.chunks().chunk_count(), 64);
    }

    #[test]
    fn test_move_and_resize_cannot_make_items_unplaceable() {
        let mut b = board();
        b.add_items(vec![rect(1, Rect::new(0.0, 0.0, 10.0, 10.0)), rect(2, Rect::new(3.0e38, 0.0, 3.0e38, 10.0))]);
        assert!(b.resize_items(&[(1, Rect::new(0.0, 0.0, 1.0e6, 1.0e6))]).is_empty());
        assert_eq!(b.get(1).unwrap().rect, Rect::new(0.0, 0.0, 10.0, 10.0));

        assert_eq!(b.move_items(&[1, 2], 3.0e38, 0.0), vec![1]);
        assert_eq!(b.get(2).unwrap().rect.x, 3.0e38);
        assert!(b.chunks().chunk_count() <= 3);
    }

    #[test]
    fn test_ids_beyond_record_range_refused() {
        let mut b = board();
        let added = b.add_items(vec![rect(MAX_ITEM_ID + 7, Rect::new(0.0, 0.0, 1.0, 1.0)), rect(MAX_ITEM_ID, Rect::new(0.0, 0.0, 1.0, 1.0))]);
        assert_eq!(added, vec![MAX_ITEM_ID]);

        let mut other = board();
        other.load_contents(&b.serialize(None));
        assert_eq!(other.len(), b.len());
    }

    #[test]
    fn test_load_skips_oversized_items() {
        let huge = rect(1, Rect::new(0.0, 0.0, 1.0e7, 1.0e7));
        let small = rect(2, Rect::new(0.0, 0.0, 1.0, 1.0));
        let mut b = board();
        b.load_contents(&codec::encode([&huge, &small]));
        assert_eq!(b.len(), 1);
        assert!(b.contains(2));
        assert_eq!(b.chunks().chunk_count(), 1);
    }

    #[test]
    fn test_set_scale_runs_async_rebuild() {
        let mut b = board();
        for id in 1..=15 {
            b.add_items(vec![rect(id, Rect::new(0.0, 0.0, 1.0, 1.0))]);
        }
        b.set_scale(2.0);
        assert_eq!(b.tick(), RebuildStatus::Running { remaining: 5 });
        assert_eq!(b.tick(), RebuildStatus::Swapped);
        assert_eq!(b.chunks().scale(), 2.0);
        b.set_scale(2.0);
        assert_eq!(b.tick(), RebuildStatus::Idle);
    }
}
