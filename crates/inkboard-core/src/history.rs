//! Bounded undo/redo stack of reversible actions.

use std::collections::VecDeque;

/// Default number of undo entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A reversible command applied against some context `C`.
///
/// `execute == false` means the local mutation already happened; the
/// action should only perform its side effects (network, persistence).
pub trait Action<C: ?Sized> {
    fn forward(&self, cx: &mut C, execute: bool);
    fn backward(&self, cx: &mut C, execute: bool);
}

/// Undo and redo history.
#[derive(Debug, Clone)]
pub struct ActionStack<A> {
    undo: VecDeque<A>,
    redo: Vec<A>,
    capacity: usize,
}

impl<A> Default for ActionStack<A> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<A> ActionStack<A> {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            redo: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record `action` and run its forward half. Clears redo history.
    pub fn push<C: ?Sized>(&mut self, action: A, cx: &mut C, execute: bool)
    where
        A: Action<C>,
    {
        if self.undo.len() >= self.capacity {
            self.undo.pop_front();
        }
        action.forward(cx, execute);
        self.undo.push_back(action);
        self.redo.clear();
    }

    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo<C: ?Sized>(&mut self, cx: &mut C) -> bool
    where
        A: Action<C>,
    {
        let Some(action) = self.undo.pop_back() else {
            return false;
        };
        action.backward(cx, true);
        self.redo.push(action);
        true
    }

    /// Returns true if redo was performed, false if nothing to redo.
    pub fn redo<C: ?Sized>(&mut self, cx: &mut C) -> bool
    where
        A: Action<C>,
    {
        let Some(action) = self.redo.pop() else {
            return false;
        };
        action.forward(cx, true);
        self.undo.push_back(action);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent undoable action.
    pub fn last(&self) -> Option<&A> {
        self.undo.back()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
