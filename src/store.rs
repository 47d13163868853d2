//! Key-value document storage for settings and history.
//!
//! Each key holds one JSON document that is read and replaced whole.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait Store: Send + Sync {
    /// Read the document under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create store directory: {}", self.dir.display()))?;
        let path = self.path_for(key);
        // Write then rename so a crash never leaves half a document.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// In-process store, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(docs.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        docs.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get("prompt-history").unwrap(), None);

        store.set("prompt-history", "[]").unwrap();
        assert_eq!(store.get("prompt-history").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("nested").join("prompt-history.json").exists());

        store.set("prompt-history", "[1]").unwrap();
        assert_eq!(store.get("prompt-history").unwrap().as_deref(), Some("[1]"));
        assert!(!dir.path().join("nested").join("prompt-history.json.tmp").exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("a").unwrap().is_none());
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
    }
}
