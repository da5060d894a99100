//! Region quadtree over item bounding boxes.
//!
//! The tree stores item ids next to the bounds they were inserted with; it
//! never owns items. An item whose box spans several quadrants is stored in
//! every quadrant it touches, which keeps range queries free of special
//! cases at the cost of some duplication.

use crate::geometry::Rect;
use crate::items::ItemId;
use std::collections::HashSet;

/// Default number of items a node holds before it subdivides.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default maximum depth; nodes at this depth never subdivide.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// A quadtree node. The root is created with [`QuadTree::new`].
#[derive(Debug, Clone)]
pub struct QuadTree {
    boundary: Rect,
    depth: u32,
    capacity: usize,
    max_depth: u32,
    items: Vec<(ItemId, Rect)>,
    /// Quadrants in order top-left, top-right, bottom-right, bottom-left.
    children: Option<Box<[QuadTree; 4]>>,
}

impl QuadTree {
    pub fn new(boundary: Rect) -> Self {
        Self::with_limits(boundary, DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH)
    }

    pub fn with_limits(boundary: Rect, capacity: usize, max_depth: u32) -> Self {
        Self::node(boundary.normalized(), 0, capacity.max(1), max_depth)
    }

    fn node(boundary: Rect, depth: u32, capacity: usize, max_depth: u32) -> Self {
        Self {
            boundary,
            depth,
            capacity,
            max_depth,
            items: Vec::new(),
            children: None,
        }
    }

    pub fn boundary(&self) -> Rect {
        self.boundary
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Child nodes, if this node has subdivided.
    pub fn children(&self) -> Option<&[QuadTree; 4]> {
        self.children.as_deref()
    }

    /// Insert an item.
    ///
    /// Returns false when `bounds` misses this node or the id is already
    /// held here; otherwise true if this node or any child accepted it.
    pub fn insert(&mut self, id: ItemId, bounds: Rect) -> bool {
        let bounds = bounds.normalized();
        if !self.boundary.intersects(&bounds) {
            return false;
        }
        if self.items.iter().any(|(held, _)| *held == id) {
            return false;
        }

        if self.children.is_none() {
            if self.items.len() < self.capacity || self.depth >= self.max_depth {
                self.items.push((id, bounds));
                return true;
            }
            self.subdivide();
        }

        let mut accepted = false;
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                accepted |= child.insert(id, bounds);
            }
        }
        accepted
    }

    /// Split into four equal quadrants and push held items down.
    fn subdivide(&mut self) {
        let Rect { x, y, x2, y2 } = self.boundary;
        let c = self.boundary.center();
        let depth = self.depth + 1;
        let quadrant = |r: Rect| QuadTree::node(r, depth, self.capacity, self.max_depth);
        let mut children = Box::new([
            quadrant(Rect::new(x, y, c.x, c.y)),
            quadrant(Rect::new(c.x, y, x2, c.y)),
            quadrant(Rect::new(c.x, c.y, x2, y2)),
            quadrant(Rect::new(x, c.y, c.x, y2)),
        ]);
        for (id, bounds) in self.items.drain(..) {
            for child in children.iter_mut() {
                child.insert(id, bounds);
            }
        }
        self.children = Some(children);
    }

    /// Remove an id from every node that holds it. Returns true if any did.
    pub fn delete(&mut self, id: ItemId) -> bool {
        if let Some(pos) = self.items.iter().position(|(held, _)| *held == id) {
            self.items.remove(pos);
            return true;
        }
        let mut removed = false;
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                removed |= child.delete(id);
            }
        }
        removed
    }

    /// Ids of every item whose bounds intersect `region`.
    pub fn get(&self, region: &Rect) -> HashSet<ItemId> {
        let mut found = HashSet::new();
        self.collect(&region.normalized(), &mut found);
        found
    }

    fn collect(&self, region: &Rect, found: &mut HashSet<ItemId>) {
        if !self.boundary.intersects(region) {
            return;
        }
        for (id, bounds) in &self.items {
            if bounds.intersects(region) {
                found.insert(*id);
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.collect(region, found);
            }
        }
    }

    /// Every id held anywhere in the tree.
    pub fn get_all(&self) -> HashSet<ItemId> {
        let mut found = HashSet::new();
        self.collect_all(&mut found);
        found
    }

    fn collect_all(&self, found: &mut HashSet<ItemId>) {
        found.extend(self.items.iter().map(|(id, _)| *id));
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.collect_all(found);
            }
        }
    }

    /// Drop every item and collapse back to a single node.
    pub fn delete_all(&mut self) {
        self.items.clear();
        self.children = None;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self
                .children
                .as_ref()
                .is_none_or(|children| children.iter().all(QuadTree::is_empty))
    }
}
