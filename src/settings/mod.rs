//! Settings persistence
//!
//! The ignore list is stored as a single text blob (one entry per line)
//! under [`SETTING_KEY`], the way proxy extensions keep their settings.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;

use crate::entry::IgnoreSet;
use crate::error::PersistenceError;

/// Key the ignore list is stored under
pub const SETTING_KEY: &str = "OFSVanisher.force.ignorelist";

/// Key/value store for extension settings
pub trait SettingsStore: Send + Sync {
    fn load_setting(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn save_setting(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Load the ignore set, empty when nothing has been saved yet
pub fn load_ignore_set(store: &dyn SettingsStore) -> Result<IgnoreSet, PersistenceError> {
    let blob = store.load_setting(SETTING_KEY)?.unwrap_or_default();
    Ok(IgnoreSet::from_blob(&blob))
}

pub fn save_ignore_set(store: &dyn SettingsStore, set: &IgnoreSet) -> Result<(), PersistenceError> {
    store.save_setting(SETTING_KEY, &set.to_blob())
}

/// Settings kept in a JSON object on disk
pub struct FileSettingsStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(&self.path).map_err(|source| PersistenceError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| PersistenceError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), PersistenceError> {
        let contents =
            serde_json::to_vec_pretty(values).map_err(|e| PersistenceError::Write {
                path: self.path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
        write_atomic(&self.path, &contents)
    }
}

/// Replace `path` with `contents` through a uniquely named temp file in the
/// same directory, so readers see either the old or the new file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let write_err = |source: std::io::Error| PersistenceError::Write {
        path: path.display().to_string(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file_mut().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

impl SettingsStore for FileSettingsStore {
    fn load_setting(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)?;
        tracing::debug!(path = %self.path.display(), key, "Saved setting");
        Ok(())
    }
}

/// Settings held in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_setting(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = FileSettingsStore::new(&path);

        assert_eq!(store.load_setting(SETTING_KEY).unwrap(), None);

        let set = IgnoreSet::from_blob("example.com\nhttp://example.com/login\n^.*\\.ads\\..*$");
        save_ignore_set(&store, &set).unwrap();
        assert!(path.exists());

        let loaded = load_ignore_set(&FileSettingsStore::new(&path)).unwrap();
        assert_eq!(*loaded.snapshot(), *set.snapshot());
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.json"));

        store.save_setting("other.key", "keep me").unwrap();
        store.save_setting(SETTING_KEY, "a.test").unwrap();

        assert_eq!(store.load_setting("other.key").unwrap().as_deref(), Some("keep me"));
        assert_eq!(store.load_setting(SETTING_KEY).unwrap().as_deref(), Some("a.test"));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileSettingsStore::new(&path);
        assert!(matches!(
            store.load_setting(SETTING_KEY),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_concurrent_file_saves_leave_valid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        // Separate stores share no lock, like two processes would
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileSettingsStore::new(&path);
                    for n in 0..25 {
                        store
                            .save_setting(SETTING_KEY, &format!("w{}-{}.test", i, n))
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let saved = FileSettingsStore::new(&path)
            .load_setting(SETTING_KEY)
            .unwrap()
            .unwrap();
        assert!(saved.ends_with("-24.test"));
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::new();
        save_ignore_set(&store, &IgnoreSet::from_blob("x.test")).unwrap();
        assert_eq!(load_ignore_set(&store).unwrap().to_blob(), "x.test");
    }
}
