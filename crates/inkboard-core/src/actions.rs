//! Undoable board commands.
//!
//! A [`BoardCommand`] records everything its inverse needs at the moment it
//! is built. Running either half mutates the board (when asked to),
//! queues the matching [`BoardAction`] for peers and marks the board as
//! needing a save.

use crate::board::Board;
use crate::geometry::Rect;
use crate::history::Action;
use crate::items::{BoardItem, ItemId};
use crate::protocol::BoardAction;
use crate::storage::SaveDebouncer;
use crate::surface::SurfaceFactory;
use crate::transport::Outbox;

/// What a command touches while running.
pub struct Effects<'a, F: SurfaceFactory> {
    pub board: &'a mut Board<F>,
    pub outbox: &'a mut Outbox,
    pub saves: &'a mut SaveDebouncer,
}

impl<F: SurfaceFactory> Effects<'_, F> {
    fn emit(&mut self, action: BoardAction) {
        self.outbox.push(action);
        self.saves.mark_dirty();
    }
}

/// A reversible board mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardCommand {
    Add {
        items: Vec<BoardItem>,
    },
    /// Holds the removed items with their insertion positions so undo
    /// restores them exactly, paint order included.
    Remove {
        items: Vec<(BoardItem, u64)>,
    },
    Move {
        ids: Vec<ItemId>,
        dx: f32,
        dy: f32,
    },
    Scale {
        from: Vec<(ItemId, Rect)>,
        to: Vec<(ItemId, Rect)>,
    },
    Order {
        ids: Vec<ItemId>,
        step: i16,
        from: Vec<(ItemId, u8)>,
    },
    LockState {
        locked: bool,
        from: Vec<(ItemId, bool)>,
    },
    Label {
        label: Option<String>,
        from: Vec<(ItemId, Option<String>)>,
    },
    Color {
        color: u32,
        from: Vec<(ItemId, u32)>,
    },
    Weight {
        weight: f32,
        from: Vec<(ItemId, f32)>,
    },
    Text {
        id: ItemId,
        text: String,
        from: String,
    },
}

impl BoardCommand {
    /// Remove the given items, capturing them from the board.
    pub fn remove<F: SurfaceFactory>(board: &Board<F>, ids: &[ItemId]) -> Self {
        BoardCommand::Remove {
            items: ids
                .iter()
                .filter_map(|id| Some((board.get(*id)?.clone(), board.items().seq(*id)?)))
                .collect(),
        }
    }

    /// Resize to absolute rects, capturing the current ones.
    pub fn scale<F: SurfaceFactory>(board: &Board<F>, to: Vec<(ItemId, Rect)>) -> Self {
        let to: Vec<_> = to.into_iter().filter(|(id, _)| board.contains(*id)).collect();
        let from = to
            .iter()
            .filter_map(|(id, _)| board.get(*id).map(|item| (*id, item.rect)))
            .collect();
        BoardCommand::Scale { from, to }
    }

    pub fn order<F: SurfaceFactory>(board: &Board<F>, ids: &[ItemId], step: i16) -> Self {
        BoardCommand::Order {
            ids: ids.to_vec(),
            step,
            from: snapshot(board, ids, |item| Some(item.z_index)),
        }
    }

    pub fn lock<F: SurfaceFactory>(board: &Board<F>, ids: &[ItemId], locked: bool) -> Self {
        BoardCommand::LockState {
            locked,
            from: snapshot(board, ids, |item| Some(item.locked)),
        }
    }

    pub fn label<F: SurfaceFactory>(board: &Board<F>, ids: &[ItemId], label: Option<String>) -> Self {
        BoardCommand::Label {
            label: label.filter(|l| !l.is_empty()),
            from: snapshot(board, ids, |item| Some(item.label.clone())),
        }
    }

    /// Items without a stroke are left out.
    pub fn color<F: SurfaceFactory>(board: &Board<F>, ids: &[ItemId], color: u32) -> Self {
        BoardCommand::Color {
            color,
            from: snapshot(board, ids, |item| item.stroke().map(|s| s.color)),
        }
    }

    /// Items without a stroke are left out.
    pub fn weight<F: SurfaceFactory>(board: &Board<F>, ids: &[ItemId], weight: f32) -> Self {
        BoardCommand::Weight {
            weight: crate::items::quantize_weight(weight),
            from: snapshot(board, ids, |item| item.stroke().map(|s| s.weight)),
        }
    }

    /// `None` unless `id` is a text item.
    pub fn text<F: SurfaceFactory>(board: &Board<F>, id: ItemId, text: impl Into<String>) -> Option<Self> {
        let from = board.get(id)?.text_content()?.to_owned();
        Some(BoardCommand::Text {
            id,
            text: text.into(),
            from,
        })
    }

    /// Whether running the command would change anything.
    pub fn is_empty(&self) -> bool {
        match self {
            BoardCommand::Add { items } => items.is_empty(),
            BoardCommand::Remove { items } => items.is_empty(),
            BoardCommand::Move { ids, dx, dy } => ids.is_empty() || (*dx == 0.0 && *dy == 0.0),
            BoardCommand::Scale { to, .. } => to.is_empty(),
            BoardCommand::Order { from, step, .. } => from.is_empty() || *step == 0,
            BoardCommand::LockState { from, .. } => from.is_empty(),
            BoardCommand::Label { from, .. } => from.is_empty(),
            BoardCommand::Color { from, .. } => from.is_empty(),
            BoardCommand::Weight { from, .. } => from.is_empty(),
            BoardCommand::Text { .. } => false,
        }
    }

    fn ids<T>(from: &[(ItemId, T)]) -> Vec<ItemId> {
        from.iter().map(|(id, _)| *id).collect()
    }
}

fn snapshot<F, T>(board: &Board<F>, ids: &[ItemId], get: impl Fn(&BoardItem) -> Option<T>) -> Vec<(ItemId, T)>
where
    F: SurfaceFactory,
{
    ids.iter()
        .filter_map(|id| board.get(*id).and_then(|item| get(item)).map(|v| (*id, v)))
        .collect()
}

/// Group `(id, value)` pairs by value, keeping first-seen order.
fn group_by_value<T: PartialEq + Clone>(pairs: &[(ItemId, T)]) -> Vec<(T, Vec<ItemId>)> {
    let mut groups: Vec<(T, Vec<ItemId>)> = Vec::new();
    for (id, value) in pairs {
        match groups.iter_mut().find(|(v, _)| v == value) {
            Some((_, ids)) => ids.push(*id),
            None => groups.push((value.clone(), vec![*id])),
        }
    }
    groups
}

impl<'a, F: SurfaceFactory> Action<Effects<'a, F>> for BoardCommand {
    fn forward(&self, cx: &mut Effects<'a, F>, execute: bool) {
        match self {
            BoardCommand::Add { items } => {
                if execute {
                    cx.board.add_items(items.clone());
                }
                cx.emit(BoardAction::Add { items: items.clone() });
            }
            BoardCommand::Remove { items } => {
                let ids: Vec<ItemId> = items.iter().map(|(item, _)| item.id).collect();
                if execute {
                    cx.board.remove_by_ids(&ids);
                }
                cx.emit(BoardAction::Remove { ids });
            }
            BoardCommand::Move { ids, dx, dy } => {
                if execute {
                    cx.board.move_items(ids, *dx, *dy);
                }
                cx.emit(BoardAction::Move {
                    ids: ids.clone(),
                    dx: *dx,
                    dy: *dy,
                });
            }
            BoardCommand::Scale { to, .. } => {
                if execute {
                    cx.board.resize_items(to);
                }
                cx.emit(BoardAction::Scale { rects: to.clone() });
            }
            BoardCommand::Order { ids, step, .. } => {
                if execute {
                    cx.board.reorder(ids, *step);
                }
                cx.emit(BoardAction::Order {
                    ids: ids.clone(),
                    step: *step,
                });
            }
            BoardCommand::LockState { locked, from } => {
                let ids = Self::ids(from);
                if execute {
                    cx.board.set_locked(&ids, *locked);
                }
                cx.emit(BoardAction::LockState { ids, locked: *locked });
            }
            BoardCommand::Label { label, from } => {
                let ids = Self::ids(from);
                if execute {
                    cx.board.set_label(&ids, label.as_deref());
                }
                cx.emit(BoardAction::Label {
                    ids,
                    label: label.clone(),
                });
            }
            BoardCommand::Color { color, from } => {
                let ids = Self::ids(from);
                if execute {
                    cx.board.set_color(&ids, *color);
                }
                cx.emit(BoardAction::Color { ids, color: *color });
            }
            BoardCommand::Weight { weight, from } => {
                let ids = Self::ids(from);
                if execute {
                    cx.board.set_weight(&ids, *weight);
                }
                cx.emit(BoardAction::Weight { ids, weight: *weight });
            }
            BoardCommand::Text { id, text, .. } => {
                if execute {
                    cx.board.set_text(*id, text);
                }
                cx.emit(BoardAction::Text {
                    id: *id,
                    text: text.clone(),
                });
            }
        }
    }

    fn backward(&self, cx: &mut Effects<'a, F>, execute: bool) {
        match self {
            BoardCommand::Add { items } => {
                let ids: Vec<ItemId> = items.iter().map(|item| item.id).collect();
                if execute {
                    cx.board.remove_by_ids(&ids);
                }
                cx.emit(BoardAction::Remove { ids });
            }
            BoardCommand::Remove { items } => {
                if execute {
                    cx.board.restore_items(items.clone());
                }
                cx.emit(BoardAction::Add {
                    items: items.iter().map(|(item, _)| item.clone()).collect(),
                });
            }
            BoardCommand::Move { ids, dx, dy } => {
                if execute {
                    cx.board.move_items(ids, -dx, -dy);
                }
                cx.emit(BoardAction::Move {
                    ids: ids.clone(),
                    dx: -dx,
                    dy: -dy,
                });
            }
            BoardCommand::Scale { from, .. } => {
                if execute {
                    cx.board.resize_items(from);
                }
                cx.emit(BoardAction::Scale { rects: from.clone() });
            }
            BoardCommand::Order { ids, step, from } => {
                // Saturation makes `-step` lossy locally; peers only know steps.
                if execute {
                    cx.board.set_z_values(from);
                }
                cx.emit(BoardAction::Order {
                    ids: ids.clone(),
                    step: -step,
                });
            }
            BoardCommand::LockState { from, .. } => {
                for (locked, ids) in group_by_value(from) {
                    if execute {
                        cx.board.set_locked(&ids, locked);
                    }
                    cx.emit(BoardAction::LockState { ids, locked });
                }
            }
            BoardCommand::Label { from, .. } => {
                for (label, ids) in group_by_value(from) {
                    if execute {
                        cx.board.set_label(&ids, label.as_deref());
                    }
                    cx.emit(BoardAction::Label { ids, label });
                }
            }
            BoardCommand::Color { from, .. } => {
                for (color, ids) in group_by_value(from) {
                    if execute {
                        cx.board.set_color(&ids, color);
                    }
                    cx.emit(BoardAction::Color { ids, color });
                }
            }
            BoardCommand::Weight { from, .. } => {
                for (weight, ids) in group_by_value(from) {
                    if execute {
                        cx.board.set_weight(&ids, weight);
                    }
                    cx.emit(BoardAction::Weight { ids, weight });
                }
            }
            BoardCommand::Text { id, from, .. } => {
                if execute {
                    cx.board.set_text(*id, from);
                }
                cx.emit(BoardAction::Text {
                    id: *id,
                    text: from.clone(),
                });
            }
        }
    }
}
