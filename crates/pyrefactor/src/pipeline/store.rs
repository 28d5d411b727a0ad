//! Where the pipeline reads files from and writes them back to.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::info;
use rustc_hash::FxHashMap;

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String>;

    async fn write(&self, path: &Path, content: &str) -> Result<()>;
}

/// Reads and writes the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

#[async_trait]
impl FileStore for FsStore {
    async fn read(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Reads the filesystem but only reports what would be written
#[derive(Debug, Default)]
pub struct DryRunStore {
    would_write: Mutex<Vec<PathBuf>>,
}

impl DryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths that a real run would have written, in completion order
    pub fn would_write(&self) -> Vec<PathBuf> {
        self.would_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FileStore for DryRunStore {
    async fn read(&self, path: &Path) -> Result<String> {
        FsStore.read(path).await
    }

    async fn write(&self, path: &Path, _content: &str) -> Result<()> {
        info!("Would write {}", path.display());
        self.would_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }
}

/// In-memory file set
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<FxHashMap<PathBuf, String>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        let store = Self::new();
        for (path, content) in files {
            store.insert(path, content);
        }
        store
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), content.into());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Paths written so far, in completion order
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn read(&self, path: &Path) -> Result<String> {
        self.get(path)
            .ok_or_else(|| anyhow!("No such file: {}", path.display()))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.insert(path, content);
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_fs_store_round_trips_content() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("module.py");

        FsStore
            .write(&path, "x = 1\n")
            .await
            .expect("write should succeed");
        assert_eq!(
            FsStore.read(&path).await.expect("read should succeed"),
            "x = 1\n"
        );
    }

    #[tokio::test]
    async fn test_fs_store_read_error_names_the_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("missing.py");

        let error = FsStore.read(&path).await.expect_err("missing file");
        assert!(error.to_string().contains("missing.py"));
    }

    #[tokio::test]
    async fn test_dry_run_store_leaves_files_alone() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("module.py");
        std::fs::write(&path, "x = 1\n").expect("Failed to write fixture");

        let store = DryRunStore::new();
        store
            .write(&path, "x = 2\n")
            .await
            .expect("dry run write should succeed");

        assert_eq!(
            std::fs::read_to_string(&path).expect("fixture should exist"),
            "x = 1\n"
        );
        assert_eq!(store.would_write(), vec![path]);
    }

    #[tokio::test]
    async fn test_memory_store_tracks_writes() {
        let store = MemoryStore::with_files([("a.py", "x = 1\n")]);

        assert!(store.read(Path::new("b.py")).await.is_err());
        store
            .write(Path::new("a.py"), "x = 2\n")
            .await
            .expect("write should succeed");

        assert_eq!(store.get(Path::new("a.py")).as_deref(), Some("x = 2\n"));
        assert_eq!(store.writes(), vec![PathBuf::from("a.py")]);
    }
}
