//! Applying peers' actions to the local board.
//!
//! Remote actions go straight to board primitives. They never touch the
//! local undo history and are never echoed back to the network.

use crate::board::Board;
use crate::protocol::{BoardAction, BoardEvent};
use crate::surface::SurfaceFactory;

/// Result of applying a batch of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    /// Events that originated from the local client.
    pub skipped: usize,
    /// Every applied event was an Add.
    pub only_adds: bool,
}

impl BatchOutcome {
    /// Whether the selection may reference stale geometry after the batch.
    pub fn needs_selection_refresh(&self) -> bool {
        self.applied > 0 && !self.only_adds
    }
}

/// Apply one action to the board.
pub fn apply_action<F: SurfaceFactory>(board: &mut Board<F>, action: &BoardAction) {
    match action {
        BoardAction::Add { items } => {
            board.add_items(items.clone());
        }
        BoardAction::Remove { ids } => {
            board.remove_by_ids(ids);
        }
        BoardAction::Move { ids, dx, dy } => {
            board.move_items(ids, *dx, *dy);
        }
        BoardAction::Scale { rects } => {
            board.resize_items(rects);
        }
        BoardAction::Order { ids, step } => {
            board.reorder(ids, *step);
        }
        BoardAction::LockState { ids, locked } => {
            board.set_locked(ids, *locked);
        }
        BoardAction::Label { ids, label } => {
            board.set_label(ids, label.as_deref());
        }
        BoardAction::Color { ids, color } => {
            board.set_color(ids, *color);
        }
        BoardAction::Weight { ids, weight } => {
            board.set_weight(ids, *weight);
        }
        BoardAction::Text { id, text } => {
            if board.set_text(*id, text).is_none() {
                log::debug!("text update for unknown or non-text item {id}");
            }
        }
    }
}

/// Apply a peer's event. Returns false for the local client's own events.
pub fn apply_event<F: SurfaceFactory>(board: &mut Board<F>, local: &str, event: &BoardEvent) -> bool {
    if event.by == local {
        return false;
    }
    log::trace!("applying {:?} from {}", event.action.kind(), event.by);
    apply_action(board, &event.action);
    true
}

/// Apply events in order, e.g. the history replayed on join.
pub fn apply_batch<F: SurfaceFactory>(board: &mut Board<F>, local: &str, events: &[BoardEvent]) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        only_adds: true,
        ..Default::default()
    };
    for event in events {
        if apply_event(board, local, event) {
            outcome.applied += 1;
            outcome.only_adds &= event.action.is_add();
        } else {
            outcome.skipped += 1;
        }
    }
    if outcome.applied > 0 {
        log::debug!(
            "applied {} remote events ({} own skipped)",
            outcome.applied,
            outcome.skipped
        );
    }
    outcome
}
