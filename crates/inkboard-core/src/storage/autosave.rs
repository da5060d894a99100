//! Debounced saving of the open board.

use crate::storage::{FileStorage, Storage, StorageResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Key under which the most recently saved board is also kept.
pub const LAST_BOARD_KEY: &str = "__last_board__";

/// Tracks unsaved changes and decides when a save is due.
///
/// A save is due once the board is dirty and at least `interval` has passed
/// since the last save.
#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    interval: Duration,
    last_save: Option<Instant>,
    dirty: bool,
}

impl SaveDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_save: None,
            dirty: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn should_save(&self) -> bool {
        self.should_save_at(Instant::now())
    }

    pub fn should_save_at(&self, now: Instant) -> bool {
        self.dirty
            && self
                .last_save
                .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    pub fn mark_saved(&mut self) {
        self.mark_saved_at(Instant::now());
    }

    pub fn mark_saved_at(&mut self, now: Instant) {
        self.last_save = Some(now);
        self.dirty = false;
    }
}

/// Storage front for the open board.
pub struct AutoSave<S: Storage> {
    storage: Arc<S>,
    board_id: String,
}

impl<S: Storage> AutoSave<S> {
    pub fn new(storage: Arc<S>, board_id: impl Into<String>) -> Self {
        Self {
            storage,
            board_id: board_id.into(),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn set_board_id(&mut self, id: impl Into<String>) {
        self.board_id = id.into();
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Save `blob` if `debouncer` says a save is due. Returns whether it
    /// saved.
    pub async fn maybe_save(&self, debouncer: &mut SaveDebouncer, blob: impl FnOnce() -> Vec<u8>) -> StorageResult<bool> {
        if !debouncer.should_save() {
            return Ok(false);
        }
        self.save(&blob()).await?;
        debouncer.mark_saved();
        Ok(true)
    }

    /// Save now, under the board id and as the last board.
    pub async fn save(&self, blob: &[u8]) -> StorageResult<()> {
        self.storage.save(&self.board_id, blob).await?;
        self.storage.save(LAST_BOARD_KEY, blob).await?;
        log::debug!("saved board {} ({} bytes)", self.board_id, blob.len());
        Ok(())
    }

    /// Load a board and make it the current one.
    pub async fn load(&mut self, id: &str) -> StorageResult<Vec<u8>> {
        let blob = self.storage.load(id).await?;
        self.board_id = id.to_string();
        Ok(blob)
    }

    /// The most recently saved board, if any.
    pub async fn load_last(&self) -> Option<Vec<u8>> {
        match self.storage.load(LAST_BOARD_KEY).await {
            Ok(blob) => Some(blob),
            Err(e) => {
                log::debug!("no last board: {e}");
                None
            }
        }
    }

    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        self.storage.delete(id).await
    }

    /// Saved board ids, without the last-board alias.
    pub async fn list_boards(&self) -> StorageResult<Vec<String>> {
        let mut ids = self.storage.list().await?;
        ids.retain(|id| id != LAST_BOARD_KEY);
        Ok(ids)
    }

    pub async fn exists(&self, id: &str) -> StorageResult<bool> {
        self.storage.exists(id).await
    }
}

/// Autosave into the default on-disk location.
pub fn create_autosave(board_id: impl Into<String>) -> StorageResult<AutoSave<FileStorage>> {
    Ok(AutoSave::new(Arc::new(FileStorage::default_location()?), board_id))
}
