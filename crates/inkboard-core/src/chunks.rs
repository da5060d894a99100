//! Tiled rendering of the infinite board.
//!
//! The plane is cut into square tiles. A tile is materialized as a
//! [`Chunk`] the first time an item touches it; each chunk owns a quadtree
//! of the items overlapping it and a surface holding their pixels.
//!
//! Mutations repaint only the damaged region of the affected chunks. A
//! zoom change rebuilds every chunk at the new resolution, in small batches
//! per frame, into a scratch set that replaces the live one once complete.

use crate::board::ItemTable;
use crate::config::EngineConfig;
use crate::geometry::{Point, Rect};
use crate::items::{BoardItem, ItemId, Stroke};
use crate::quadtree::QuadTree;
use crate::surface::{Surface, SurfaceFactory, paint_item};
use peniko::Color;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Integer tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
}

impl TileKey {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing `p`.
    pub fn of(p: Point, tile_size: f32) -> Self {
        Self::new(tile_coord(p.x, tile_size), tile_coord(p.y, tile_size))
    }

    /// Board-space rect covered by this tile.
    pub fn bounds(&self, tile_size: f32) -> Rect {
        Rect::from_origin_size(self.x as f32 * tile_size, self.y as f32 * tile_size, tile_size, tile_size)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

fn tile_coord(v: f32, tile_size: f32) -> i32 {
    (v / tile_size).floor() as i32
}

/// Number of tiles touched by `bounds`.
pub fn tile_count(bounds: &Rect, tile_size: f32) -> u64 {
    let b = bounds.normalized();
    let span = |lo: f32, hi: f32| (tile_coord(hi, tile_size) as i64 - tile_coord(lo, tile_size) as i64 + 1) as u64;
    span(b.x, b.x2).saturating_mul(span(b.y, b.y2))
}

/// Every tile touched by `bounds`, inclusive on both ends.
pub fn tile_range(bounds: &Rect, tile_size: f32) -> impl Iterator<Item = TileKey> + use<> {
    let b = bounds.normalized();
    let (x0, x1) = (tile_coord(b.x, tile_size), tile_coord(b.x2, tile_size));
    let (y0, y1) = (tile_coord(b.y, tile_size), tile_coord(b.y2, tile_size));
    (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| TileKey::new(x, y)))
}

/// Parameters shared by every chunk of a manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkLayout {
    pub tile_size: f32,
    pub capacity: usize,
    pub max_depth: u32,
    pub damage_margin: f32,
    pub background: Color,
    pub rebuild_batch: usize,
    pub max_item_tiles: usize,
}

impl From<&EngineConfig> for ChunkLayout {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            capacity: config.quadtree_capacity,
            max_depth: config.quadtree_max_depth,
            damage_margin: config.damage_margin,
            background: Stroke::new(config.background, 0.0).color(),
            rebuild_batch: config.rebuild_batch.max(1),
            max_item_tiles: config.max_item_tiles.max(1),
        }
    }
}

/// One materialized tile.
#[derive(Debug)]
pub struct Chunk<S> {
    key: TileKey,
    bounds: Rect,
    tree: QuadTree,
    surface: S,
}

impl<S> Chunk<S> {
    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

impl<S: Surface> Chunk<S> {
    /// Repaint `region` of this chunk from scratch.
    fn repaint(&mut self, region: &Rect, table: &ItemTable, background: Color) {
        let Some(clip) = region.intersection(&self.bounds) else {
            return;
        };
        let mut items: Vec<&BoardItem> = self
            .tree
            .get(&clip)
            .into_iter()
            .filter_map(|id| table.get(id))
            .collect();
        items.sort_by_key(|item| table.order_key(item.id));

        let area = clip.to_kurbo();
        self.surface.scissor(area, &mut |s: &mut S| {
            s.fill_rect(area, background);
            for item in &items {
                paint_item(s, item);
            }
        });
    }
}

/// A full set of chunks rendered at one scale.
#[derive(Debug)]
struct ChunkSet<S> {
    scale: f64,
    chunks: HashMap<TileKey, Chunk<S>>,
}

impl<S: Surface> ChunkSet<S> {
    fn new(scale: f64) -> Self {
        Self {
            scale,
            chunks: HashMap::new(),
        }
    }

    fn ensure<F>(&mut self, key: TileKey, factory: &mut F, layout: &ChunkLayout) -> &mut Chunk<S>
    where
        F: SurfaceFactory<Surface = S>,
    {
        let scale = self.scale;
        self.chunks.entry(key).or_insert_with(|| {
            let bounds = key.bounds(layout.tile_size);
            let mut surface = factory.create(key, bounds, scale);
            surface.clear(layout.background);
            log::debug!("materialized chunk {key}");
            Chunk {
                key,
                bounds,
                tree: QuadTree::with_limits(bounds, layout.capacity, layout.max_depth),
                surface,
            }
        })
    }

    /// Index an item and draw it.
    ///
    /// The item is painted straight onto the surface unless something
    /// already in the chunk sorts above it, in which case the covered
    /// region is repainted so the stacking stays correct.
    fn insert<F>(&mut self, item: &BoardItem, table: &ItemTable, factory: &mut F, layout: &ChunkLayout)
    where
        F: SurfaceFactory<Surface = S>,
    {
        let bounds = item.bounds();
        let order = table.order_key(item.id);
        for key in tile_range(&bounds, layout.tile_size) {
            let chunk = self.ensure(key, factory, layout);
            if !chunk.tree.insert(item.id, bounds) {
                continue;
            }
            let occluded = chunk
                .tree
                .get(&bounds)
                .into_iter()
                .any(|other| other != item.id && table.order_key(other) > order);
            if occluded {
                let damage = bounds.inflate(layout.damage_margin, layout.damage_margin);
                chunk.repaint(&damage, table, layout.background);
            } else {
                paint_item(&mut chunk.surface, item);
            }
        }
    }

    /// Drop an id from every chunk under `bounds`. Returns whether any held it.
    fn unindex(&mut self, id: ItemId, bounds: &Rect, layout: &ChunkLayout) -> bool {
        let mut removed = false;
        for key in tile_range(bounds, layout.tile_size) {
            if let Some(chunk) = self.chunks.get_mut(&key) {
                removed |= chunk.tree.delete(id);
            }
        }
        removed
    }

    fn index<F>(&mut self, item: &BoardItem, factory: &mut F, layout: &ChunkLayout)
    where
        F: SurfaceFactory<Surface = S>,
    {
        let bounds = item.bounds();
        for key in tile_range(&bounds, layout.tile_size) {
            self.ensure(key, factory, layout).tree.insert(item.id, bounds);
        }
    }

    fn remove(&mut self, id: ItemId, bounds: &Rect, table: &ItemTable, layout: &ChunkLayout) {
        if self.unindex(id, bounds, layout) {
            self.repaint(&bounds.inflate(layout.damage_margin, layout.damage_margin), table, layout);
        }
    }

    fn update<F>(&mut self, item: &BoardItem, old: &Rect, table: &ItemTable, factory: &mut F, layout: &ChunkLayout)
    where
        F: SurfaceFactory<Surface = S>,
    {
        self.unindex(item.id, old, layout);
        self.index(item, factory, layout);
        let m = layout.damage_margin;
        self.repaint(&old.inflate(m, m), table, layout);
        let new = item.bounds();
        if new != old.normalized() {
            self.repaint(&new.inflate(m, m), table, layout);
        }
    }

    /// Keys of existing chunks under `region`. Huge regions walk the chunk
    /// map instead of the tile range.
    fn keys_under(&self, region: &Rect, tile_size: f32) -> Vec<TileKey> {
        if tile_count(region, tile_size) <= self.chunks.len() as u64 {
            tile_range(region, tile_size)
                .filter(|key| self.chunks.contains_key(key))
                .collect()
        } else {
            let region = region.normalized();
            self.chunks
                .values()
                .filter(|chunk| chunk.bounds.intersects(&region))
                .map(|chunk| chunk.key)
                .collect()
        }
    }

    fn repaint(&mut self, region: &Rect, table: &ItemTable, layout: &ChunkLayout) {
        for key in self.keys_under(region, layout.tile_size) {
            if let Some(chunk) = self.chunks.get_mut(&key) {
                chunk.repaint(region, table, layout.background);
            }
        }
    }

    fn items_within(&self, region: &Rect, layout: &ChunkLayout) -> HashSet<ItemId> {
        let mut found = HashSet::new();
        for key in self.keys_under(region, layout.tile_size) {
            if let Some(chunk) = self.chunks.get(&key) {
                found.extend(chunk.tree.get(region));
            }
        }
        found
    }
}

/// Progress of the asynchronous rebuild after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStatus {
    /// No rebuild is running.
    Idle,
    Running { remaining: usize },
    /// The scratch set replaced the live chunks during this tick.
    Swapped,
}

struct RebuildJob<S> {
    scratch: ChunkSet<S>,
    pending: VecDeque<ItemId>,
    processed: HashSet<ItemId>,
}

/// Owns every chunk and keeps them in step with the item table.
///
/// The manager never owns items: every call that may paint takes the
/// [`ItemTable`] the items live in, already updated for the mutation.
pub struct ChunkManager<F: SurfaceFactory> {
    factory: F,
    layout: ChunkLayout,
    live: ChunkSet<F::Surface>,
    rebuild: Option<RebuildJob<F::Surface>>,
}

impl<F: SurfaceFactory> fmt::Debug for ChunkManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkManager")
            .field("layout", &self.layout)
            .field("scale", &self.live.scale)
            .field("chunks", &self.live.chunks.len())
            .field("rebuilding", &self.rebuild.is_some())
            .finish()
    }
}

impl<F: SurfaceFactory> ChunkManager<F> {
    pub fn new(factory: F, config: &EngineConfig) -> Self {
        Self {
            factory,
            layout: ChunkLayout::from(config),
            live: ChunkSet::new(1.0),
            rebuild: None,
        }
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn tile_size(&self) -> f32 {
        self.layout.tile_size
    }

    /// Pixels per board unit of the live chunks.
    pub fn scale(&self) -> f64 {
        self.live.scale
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn chunk(&self, key: TileKey) -> Option<&Chunk<F::Surface>> {
        self.live.chunks.get(&key)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk<F::Surface>> {
        self.live.chunks.values()
    }

    /// Live chunks overlapping `region`, for drawing a viewport.
    pub fn visible_chunks(&self, region: &Rect) -> Vec<&Chunk<F::Surface>> {
        let mut chunks: Vec<_> = self
            .live
            .keys_under(region, self.layout.tile_size)
            .into_iter()
            .filter_map(|key| self.live.chunks.get(&key))
            .collect();
        chunks.sort_by_key(|c| c.key);
        chunks
    }

    /// Whether an item with these bounds stays within the per-item tile
    /// limit.
    pub fn fits(&self, bounds: &Rect) -> bool {
        tile_count(bounds, self.layout.tile_size) <= self.layout.max_item_tiles as u64
    }

    pub fn chunk_count(&self) -> usize {
        self.live.chunks.len()
    }

    /// Index and draw items already present in `table`.
    pub fn add_to_chunk<'a, I>(&mut self, items: I, table: &ItemTable)
    where
        I: IntoIterator<Item = &'a BoardItem>,
    {
        for item in items {
            self.live.insert(item, table, &mut self.factory, &self.layout);
            if let Some(job) = self.rebuild.as_mut() {
                if job.processed.insert(item.id) {
                    job.scratch.insert(item, table, &mut self.factory, &self.layout);
                }
            }
        }
    }

    /// Unindex items already gone from `table` and repaint where they were.
    pub fn remove_from_chunk<'a, I>(&mut self, removed: I, table: &ItemTable)
    where
        I: IntoIterator<Item = &'a (ItemId, Rect)>,
    {
        for (id, bounds) in removed {
            self.live.remove(*id, bounds, table, &self.layout);
            if let Some(job) = self.rebuild.as_mut() {
                if job.processed.remove(id) {
                    job.scratch.remove(*id, bounds, table, &self.layout);
                }
            }
        }
    }

    /// Reindex an item whose bounds or appearance changed; `old` is its
    /// bounds before the change.
    pub fn update(&mut self, item: &BoardItem, old: &Rect, table: &ItemTable) {
        self.live.update(item, old, table, &mut self.factory, &self.layout);
        if let Some(job) = self.rebuild.as_mut() {
            if job.processed.contains(&item.id) {
                job.scratch.update(item, old, table, &mut self.factory, &self.layout);
            }
        }
    }

    /// Repaint a region without changing the index.
    pub fn repaint(&mut self, region: &Rect, table: &ItemTable) {
        self.live.repaint(region, table, &self.layout);
        if let Some(job) = self.rebuild.as_mut() {
            job.scratch.repaint(region, table, &self.layout);
        }
    }

    /// Ids of live items whose bounds intersect `region`.
    pub fn items_within(&self, region: &Rect) -> HashSet<ItemId> {
        self.live.items_within(region, &self.layout)
    }

    /// Clear every chunk and redraw the whole table synchronously.
    pub fn rebuild(&mut self, table: &ItemTable) {
        self.cancel_rebuild();
        let mut set = ChunkSet::new(self.live.scale);
        for id in table.ids_in_paint_order() {
            if let Some(item) = table.get(id) {
                set.insert(item, table, &mut self.factory, &self.layout);
            }
        }
        self.live = set;
    }

    /// Drop every chunk, cancelling any rebuild.
    pub fn clear(&mut self) {
        self.cancel_rebuild();
        self.live = ChunkSet::new(self.live.scale);
    }

    /// Start rebuilding at a new scale; any running rebuild is discarded.
    pub fn begin_rebuild(&mut self, scale: f64, table: &ItemTable) {
        self.cancel_rebuild();
        let pending: VecDeque<ItemId> = table.ids_in_paint_order().into();
        log::debug!("rebuild at scale {scale}: {} items", pending.len());
        self.rebuild = Some(RebuildJob {
            scratch: ChunkSet::new(scale),
            pending,
            processed: HashSet::new(),
        });
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuild.is_some()
    }

    /// Scale the running rebuild targets, if any.
    pub fn pending_scale(&self) -> Option<f64> {
        self.rebuild.as_ref().map(|job| job.scratch.scale)
    }

    /// Discard the scratch set. Live chunks are untouched.
    pub fn cancel_rebuild(&mut self) {
        if let Some(job) = self.rebuild.take() {
            log::debug!("rebuild cancelled with {} items pending", job.pending.len());
        }
    }

    /// Advance the rebuild by one batch.
    pub fn tick(&mut self, table: &ItemTable) -> RebuildStatus {
        let Some(job) = self.rebuild.as_mut() else {
            return RebuildStatus::Idle;
        };
        let mut budget = self.layout.rebuild_batch;
        while budget > 0 {
            let Some(id) = job.pending.pop_front() else {
                break;
            };
            if job.processed.contains(&id) {
                continue;
            }
            let Some(item) = table.get(id) else {
                continue;
            };
            job.processed.insert(id);
            job.scratch.insert(item, table, &mut self.factory, &self.layout);
            budget -= 1;
        }

        if !job.pending.is_empty() {
            return RebuildStatus::Running {
                remaining: job.pending.len(),
            };
        }
        if let Some(job) = self.rebuild.take() {
            log::debug!("rebuild finished at scale {}", job.scratch.scale);
            self.live = job.scratch;
        }
        RebuildStatus::Swapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PressurePoint;
    use crate::items::Stroke;
    use crate::surface::testing::{DrawOp, RecordingFactory};

    fn manager() -> ChunkManager<RecordingFactory> {
        ChunkManager::new(RecordingFactory::default(), &EngineConfig::default())
    }

    fn rect_item(id: ItemId, r: Rect, color: u32, z: u8) -> BoardItem {
        let mut item = BoardItem::rectangle(r, Stroke::new(color, 2.0), true).with_z_index(z);
        item.id = id;
        item
    }

    fn add(m: &mut ChunkManager<RecordingFactory>, table: &mut ItemTable, item: BoardItem) {
        let id = item.id;
        table.insert(item);
        m.add_to_chunk(table.get(id), table);
    }

    #[test]
    fn test_tile_keys() {
        assert_eq!(TileKey::of(Point::new(-1.0, 1999.0), 2000.0), TileKey::new(-1, 0));
        assert_eq!(TileKey::new(3, -2).to_string(), "3_-2");
        let keys: Vec<_> = tile_range(&Rect::new(1990.0, 10.0, 2010.0, 10.0), 2000.0).collect();
        assert_eq!(keys, vec![TileKey::new(0, 0), TileKey::new(1, 0)]);
    }

    #[test]
    fn test_path_in_first_tile_then_removed() {
        let mut m = manager();
        let mut table = ItemTable::default();
        let mut path = BoardItem::path(
            vec![PressurePoint::new(10.0, 10.0), PressurePoint::new(50.0, 80.0)],
            Stroke::default(),
        )
        .unwrap();
        path.id = 7;
        add(&mut m, &mut table, path);

        assert_eq!(m.chunk_count(), 1);
        assert!(m.chunk(TileKey::new(0, 0)).is_some());
        let hits = m.items_within(&Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(hits, HashSet::from([7]));

        let gone = table.remove(7).unwrap();
        m.remove_from_chunk(&[(7, gone.bounds())], &table);
        assert!(m.items_within(&Rect::new(0.0, 0.0, 100.0, 100.0)).is_empty());
    }

    #[test]
    fn test_tile_count() {
        assert_eq!(tile_count(&Rect::new(0.0, 0.0, 10.0, 10.0), 2000.0), 1);
        assert_eq!(tile_count(&Rect::new(1990.0, 1990.0, 2010.0, 2010.0), 2000.0), 4);
        assert_eq!(tile_count(&Rect::new(0.0, 0.0, 1.0e6, 1.0e6), 2000.0), 501 * 501);
        assert!(tile_count(&Rect::new(-3.0e38, -3.0e38, 3.0e38, 3.0e38), 1.0) > u32::MAX as u64);
    }

    #[test]
    fn test_huge_query_region_walks_existing_chunks() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(10.0, 10.0, 20.0, 20.0), 0xFF, 0));
        add(&mut m, &mut table, rect_item(2, Rect::new(-5000.0, 9000.0, -4990.0, 9010.0), 0xFF, 0));
        let everywhere = Rect::new(-1.0e30, -1.0e30, 1.0e30, 1.0e30);
        assert_eq!(m.items_within(&everywhere), HashSet::from([1, 2]));
        assert_eq!(m.visible_chunks(&everywhere).len(), 2);
        assert!(m.fits(&Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(!m.fits(&everywhere));
    }

    #[test]
    fn test_item_on_tile_corner_lands_in_four_chunks() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(1990.0, 1990.0, 2010.0, 2010.0), 0xFF, 0));
        assert_eq!(m.chunk_count(), 4);
        for key in [TileKey::new(0, 0), TileKey::new(1, 0), TileKey::new(0, 1), TileKey::new(1, 1)] {
            assert!(m.chunk(key).unwrap().tree().get_all().contains(&1));
        }
    }

    #[test]
    fn test_zero_area_item_insertable() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(5.0, 5.0, 5.0, 5.0), 0xFF, 0));
        assert!(m.items_within(&Rect::new(5.0, 5.0, 5.0, 5.0)).contains(&1));
    }

    #[test]
    fn test_add_draws_incrementally() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0x11, 0));
        add(&mut m, &mut table, rect_item(2, Rect::new(5.0, 5.0, 15.0, 15.0), 0x22, 0));
        let ops = &m.chunk(TileKey::new(0, 0)).unwrap().surface().ops;
        assert_eq!(ops, &vec![DrawOp::Clear, DrawOp::Rect(0x11), DrawOp::Rect(0x22)]);
    }

    #[test]
    fn test_add_below_existing_repaints_in_z_order() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0x11, 5));
        add(&mut m, &mut table, rect_item(2, Rect::new(5.0, 5.0, 15.0, 15.0), 0x22, 1));
        let surface = m.chunk(TileKey::new(0, 0)).unwrap().surface();
        assert!(matches!(surface.ops[2], DrawOp::Scissor(_)));
        // The repaint draws the lower item first.
        assert_eq!(surface.shape_colors(), vec![0x11, 0x22, 0x11]);
    }

    #[test]
    fn test_remove_repaints_remaining_by_z_then_insertion() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0x11, 3));
        add(&mut m, &mut table, rect_item(2, Rect::new(0.0, 0.0, 10.0, 10.0), 0x22, 3));
        add(&mut m, &mut table, rect_item(3, Rect::new(0.0, 0.0, 10.0, 10.0), 0x33, 9));
        add(&mut m, &mut table, rect_item(4, Rect::new(0.0, 0.0, 10.0, 10.0), 0x44, 0));

        let gone = table.remove(3).unwrap();
        let before = m.chunk(TileKey::new(0, 0)).unwrap().surface().ops.len();
        m.remove_from_chunk(&[(3, gone.bounds())], &table);
        let ops = &m.chunk(TileKey::new(0, 0)).unwrap().surface().ops[before..];
        let expected_clip = Rect::new(0.0, 0.0, 55.0, 55.0).to_kurbo();
        assert_eq!(
            ops,
            &[
                DrawOp::Scissor(expected_clip),
                DrawOp::Fill(expected_clip),
                DrawOp::Rect(0x44),
                DrawOp::Rect(0x11),
                DrawOp::Rect(0x22),
                DrawOp::EndScissor,
            ]
        );
    }

    #[test]
    fn test_repaint_is_idempotent() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0x11, 0));
        add(&mut m, &mut table, rect_item(2, Rect::new(20.0, 0.0, 30.0, 10.0), 0x22, 0));
        let region = Rect::new(0.0, 0.0, 40.0, 40.0);
        m.repaint(&region, &table);
        let first = m.chunk(TileKey::new(0, 0)).unwrap().surface().ops.len();
        m.repaint(&region, &table);
        let ops = &m.chunk(TileKey::new(0, 0)).unwrap().surface().ops;
        assert_eq!(ops[first - 5..first], ops[first..]);
    }

    #[test]
    fn test_update_moves_between_tiles() {
        let mut m = manager();
        let mut table = ItemTable::default();
        add(&mut m, &mut table, rect_item(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0x11, 0));
        let old = table.get(1).unwrap().bounds();
        table.get_mut(1).unwrap().translate(3000.0, 0.0);
        let item = table.get(1).unwrap().clone();
        m.update(&item, &old, &table);
        assert!(m.items_within(&Rect::new(0.0, 0.0, 100.0, 100.0)).is_empty());
        assert!(m.items_within(&Rect::new(3000.0, 0.0, 3010.0, 10.0)).contains(&1));
    }

    #[test]
    fn test_sync_rebuild_keeps_every_item() {
        let mut m = manager();
        let mut table = ItemTable::default();
        for id in 1..=30 {
            let x = id as f32 * 150.0;
            add(&mut m, &mut table, rect_item(id, Rect::new(x, 0.0, x + 20.0, 20.0), 0x11, 0));
        }
        m.rebuild(&table);
        let all = m.items_within(&Rect::new(0.0, 0.0, 10_000.0, 100.0));
        assert_eq!(all.len(), 30);
    }

    #[test]
    fn test_async_rebuild_swaps_after_all_batches() {
        let mut m = manager();
        let mut table = ItemTable::default();
        for id in 1..=25 {
            let x = id as f32 * 30.0;
            add(&mut m, &mut table, rect_item(id, Rect::new(x, 0.0, x + 20.0, 20.0), 0x11, 0));
        }
        m.begin_rebuild(2.0, &table);
        assert_eq!(m.tick(&table), RebuildStatus::Running { remaining: 15 });
        assert_eq!(m.scale(), 1.0);

        // Mutations mid-rebuild reach the scratch set.
        add(&mut m, &mut table, rect_item(99, Rect::new(900.0, 0.0, 920.0, 20.0), 0x99, 0));
        let gone = table.remove(25).unwrap();
        m.remove_from_chunk(&[(25, gone.bounds())], &table);

        assert_eq!(m.tick(&table), RebuildStatus::Running { remaining: 5 });
        assert_eq!(m.tick(&table), RebuildStatus::Swapped);
        assert_eq!(m.scale(), 2.0);
        assert_eq!(m.tick(&table), RebuildStatus::Idle);

        let all = m.items_within(&Rect::new(0.0, 0.0, 2000.0, 100.0));
        assert_eq!(all.len(), 25);
        assert!(all.contains(&99));
        assert!(!all.contains(&25));
    }

    #[test]
    fn test_new_rebuild_cancels_running_one() {
        let mut m = manager();
        let mut table = ItemTable::default();
        for id in 1..=25 {
            add(&mut m, &mut table, rect_item(id, Rect::new(0.0, 0.0, 5.0, 5.0), 0x11, 0));
        }
        m.begin_rebuild(2.0, &table);
        m.tick(&table);
        m.begin_rebuild(4.0, &table);
        assert_eq!(m.pending_scale(), Some(4.0));
        assert_eq!(m.tick(&table), RebuildStatus::Running { remaining: 15 });
        m.cancel_rebuild();
        assert!(!m.is_rebuilding());
        assert_eq!(m.scale(), 1.0);
        assert_eq!(m.items_within(&Rect::new(0.0, 0.0, 5.0, 5.0)).len(), 25);
    }
}
