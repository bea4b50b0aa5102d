use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracker_engine::{AtomicFileWriter, KeyValueStore, PersistError};
use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    entries: BTreeMap<String, String>,
}

/// Durable key/value store kept in one ron file.
///
/// Every change rewrites the whole file atomically, so a crash leaves either
/// the old or the new content behind. The file is read again before each
/// change so keys written by another process in the meantime are kept, but
/// two processes writing the same key still race: the last write wins.
pub(crate) struct RonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl RonFileStore {
    /// Loads `path`. A missing or unreadable file starts out empty.
    pub(crate) fn open(path: PathBuf) -> Self {
        let entries = load_entries(&path);
        tracker_info!("Loaded {} saved entries from {:?}", entries.len(), path);
        Self { path, entries }
    }

    /// Picks up whatever is on disk now before a change is applied.
    fn reload(&mut self) {
        self.entries = load_entries(&self.path);
    }

    fn flush(&self) -> Result<(), PersistError> {
        let Some(filename) = self.path.file_name().and_then(|name| name.to_str()) else {
            return Err(PersistError::OutputDir(format!(
                "state path {:?} has no file name",
                self.path
            )));
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let state = PersistedState {
            entries: self.entries.clone(),
        };
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(&state, pretty)
            .map_err(|err| PersistError::Encode(err.to_string()))?;

        AtomicFileWriter::new(dir).write(filename, &content)?;
        tracker_debug!("Wrote state file {:?}", self.path);
        Ok(())
    }
}

impl KeyValueStore for RonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.reload();
        if self.entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.reload();
        if self.entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush()
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return BTreeMap::new();
        }
        Err(err) => {
            tracker_warn!("Failed to read state file {:?}: {}", path, err);
            return BTreeMap::new();
        }
    };

    match ron::from_str::<PersistedState>(&content) {
        Ok(state) => state.entries,
        Err(err) => {
            tracker_warn!("Failed to parse state file {:?}: {}", path, err);
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracker_core::JobId;
    use tracker_engine::{TrackerStorage, TRACKED_KEY};

    #[test]
    fn values_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.ron");

        let mut store = RonFileStore::open(path.clone());
        assert_eq!(store.get("backendBaseUri"), None);
        store.set("backendBaseUri", "http://host:9000").unwrap();
        store.set(TRACKED_KEY, r#"["j1"]"#).unwrap();

        let reopened = RonFileStore::open(path);
        assert_eq!(
            reopened.get("backendBaseUri").as_deref(),
            Some("http://host:9000")
        );
        assert_eq!(reopened.get(TRACKED_KEY).as_deref(), Some(r#"["j1"]"#));
    }

    #[test]
    fn removed_keys_stay_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.ron");

        let mut store = RonFileStore::open(path.clone());
        store.set(TRACKED_KEY, r#"["j1"]"#).unwrap();
        store.remove(TRACKED_KEY).unwrap();
        store.remove("never-set").unwrap();

        assert_eq!(RonFileStore::open(path).get(TRACKED_KEY), None);
    }

    #[test]
    fn writers_sharing_a_file_keep_each_others_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.ron");

        let mut first = RonFileStore::open(path.clone());
        let mut second = RonFileStore::open(path.clone());
        first.set("backendBaseUri", "http://host:9000").unwrap();
        second.set(TRACKED_KEY, r#"["j1"]"#).unwrap();
        first.remove("never-set").unwrap();

        let reopened = RonFileStore::open(path);
        assert_eq!(
            reopened.get("backendBaseUri").as_deref(),
            Some("http://host:9000")
        );
        assert_eq!(reopened.get(TRACKED_KEY).as_deref(), Some(r#"["j1"]"#));
    }

    #[test]
    fn external_edit_is_seen_before_writing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.ron");

        let mut store = RonFileStore::open(path.clone());
        store.set("k", "v").unwrap();
        fs::remove_file(&path).unwrap();
        store.set("other", "w").unwrap();

        let reopened = RonFileStore::open(path);
        assert_eq!(reopened.get("k"), None);
        assert_eq!(reopened.get("other").as_deref(), Some("w"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.ron");
        fs::write(&path, "not ron at all (").unwrap();

        let store = RonFileStore::open(path);
        assert_eq!(store.get(TRACKED_KEY), None);
    }

    #[test]
    fn missing_parent_directory_is_created() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.ron");

        let mut store = RonFileStore::open(path.clone());
        store.set("k", "v").unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn tracker_storage_round_trips_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.ron");

        let mut storage = TrackerStorage::new(RonFileStore::open(path.clone()));
        storage
            .write_tracked(&["a".into(), "b".into()])
            .unwrap();
        storage.save_endpoint("https://api.example.com/").unwrap();

        let reloaded = TrackerStorage::new(RonFileStore::open(path));
        assert_eq!(
            reloaded.tracked_ids(),
            vec![JobId::from("a"), JobId::from("b")]
        );
        assert_eq!(reloaded.endpoint().as_deref(), Some("https://api.example.com"));
    }
}
