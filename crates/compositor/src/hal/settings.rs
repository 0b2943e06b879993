//! Key/value persistence for decorator settings and group archives.

use crate::error::{CompositorError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Opaque blob store, provided by the settings subsystem.
pub trait SettingsStore: Send + Sync {
    fn store(&self, key: &str, blob: &[u8]) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// In-memory store, used by default and in tests.
#[derive(Default)]
pub struct MemorySettings {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SettingsStore for MemorySettings {
    fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

/// Store that keeps one file per key under a directory.
pub struct FileSettings {
    root: PathBuf,
}

impl FileSettings {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        log::info!("Settings directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(CompositorError::Settings("empty settings key".into()));
        }
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Ok(self.root.join(format!("{}.blob", name)))
    }
}

impl SettingsStore for FileSettings {
    fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("blob.tmp");
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &path)?;
        log::debug!("Stored {} bytes under '{}'", blob.len(), key);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySettings::new();
        assert_eq!(store.load("a").unwrap(), None);
        store.store("a", b"hello").unwrap();
        assert_eq!(store.load("a").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSettings::new(dir.path()).unwrap();
            store.store("decorator/tabs", b"{\"x\":1}").unwrap();
        }
        let store = FileSettings::new(dir.path()).unwrap();
        assert_eq!(store.load("decorator/tabs").unwrap(), Some(b"{\"x\":1}".to_vec()));
        assert_eq!(store.load("missing").unwrap(), None);
        assert!(store.store("", b"x").is_err());
    }
}
