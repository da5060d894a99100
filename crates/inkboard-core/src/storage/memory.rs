//! In-memory storage.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Keeps boards in a map; for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    boards: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Other(format!("Lock error: {e}"))
}

impl Storage for MemoryStorage {
    fn save(&self, id: &str, data: &[u8]) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        let data = data.to_vec();
        Box::pin(async move {
            self.boards.write().map_err(poisoned)?.insert(id, data);
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let id = id.to_string();
        Box::pin(async move {
            let boards = self.boards.read().map_err(poisoned)?;
            boards.get(&id).cloned().ok_or(StorageError::NotFound(id))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.boards.write().map_err(poisoned)?.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let boards = self.boards.read().map_err(poisoned)?;
            Ok(boards.keys().cloned().collect())
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.boards.read().map_err(poisoned)?.contains_key(&id)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;

    #[test]
    fn test_save_and_load() {
        let storage = MemoryStorage::new();
        block_on(storage.save("b", &[1, 2, 3])).unwrap();
        assert_eq!(block_on(storage.load("b")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(block_on(storage.load("nope")), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_delete_and_list() {
        let storage = MemoryStorage::new();
        block_on(storage.save("a", &[])).unwrap();
        block_on(storage.save("b", &[])).unwrap();
        block_on(storage.delete("a")).unwrap();
        assert!(!block_on(storage.exists("a")).unwrap());
        assert_eq!(block_on(storage.list()).unwrap(), vec!["b".to_string()]);
    }
}
