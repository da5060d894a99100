//! One file per board on the local filesystem.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "ink";

/// Stores each board as `<id>.ink` inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open a storage directory, creating it if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&base_path)
            .map_err(|e| StorageError::Io(format!("Failed to create {}: {e}", base_path.display())))?;
        Ok(Self { base_path })
    }

    /// `<data dir>/inkboard/boards`, falling back to the home directory.
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine a data directory".to_string()))?;
        Self::new(base.join("inkboard").join("boards"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn board_path(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{safe}.{EXTENSION}"))
    }
}

impl Storage for FileStorage {
    fn save(&self, id: &str, data: &[u8]) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(id);
        let data = data.to_vec();
        Box::pin(async move {
            // Write aside and rename so a crash never leaves a torn blob.
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, &data)
                .and_then(|_| fs::rename(&tmp, &path))
                .map_err(|e| StorageError::Io(format!("Failed to write {}: {e}", path.display())))
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let path = self.board_path(id);
        let id = id.to_string();
        Box::pin(async move {
            match fs::read(&path) {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(id)),
                Err(e) => Err(StorageError::Io(format!("Failed to read {}: {e}", path.display()))),
            }
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(id);
        Box::pin(async move {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::Io(format!("Failed to delete {}: {e}", path.display()))),
            }
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            let entries =
                fs::read_dir(&base).map_err(|e| StorageError::Io(format!("Failed to read directory: {e}")))?;
            let mut ids = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == EXTENSION) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
            ids.sort();
            Ok(ids)
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.board_path(id);
        Box::pin(async move { Ok(path.is_file()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;
    use tempfile::tempdir;

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        block_on(storage.save("board-1", &[9, 8, 7])).unwrap();
        assert_eq!(block_on(storage.load("board-1")).unwrap(), vec![9, 8, 7]);
        assert!(dir.path().join("board-1.ink").is_file());
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(matches!(block_on(storage.load("missing")), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        block_on(storage.save("b", &[])).unwrap();
        block_on(storage.save("a", &[])).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(block_on(storage.list()).unwrap(), vec!["a", "b"]);
        block_on(storage.delete("a")).unwrap();
        block_on(storage.delete("a")).unwrap();
        assert!(!block_on(storage.exists("a")).unwrap());
    }

    #[test]
    fn test_sanitizes_id() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        block_on(storage.save("team/board:1*", &[1])).unwrap();
        assert_eq!(block_on(storage.load("team/board:1*")).unwrap(), vec![1]);
        assert!(dir.path().join("team_board_1_.ink").is_file());
    }
}
