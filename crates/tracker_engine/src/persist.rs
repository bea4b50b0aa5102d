use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracker_core::{normalize_base_uri, JobId};
use tracker_logging::{tracker_debug, tracker_warn};

/// Key holding the configured backend base.
pub const ENDPOINT_KEY: &str = "backendBaseUri";
/// Key holding the JSON-encoded array of tracked job ids.
pub const TRACKED_KEY: &str = "trackedJobIds";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("encoding error: {0}")]
    Encode(String),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        self.write_bytes(filename, content.as_bytes())
    }

    pub fn write_bytes(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Durable string key/value port. Every `set` replaces the whole value.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        (**self).remove(key)
    }
}

/// In-memory store. Clones share the same entries, so a clone kept aside
/// survives a simulated restart of whatever owned the original.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a consistent map: every write is a single insert/remove.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Typed view over a [`KeyValueStore`]: the endpoint base and the tracked ids.
pub struct TrackerStorage<S> {
    store: S,
}

impl<S: KeyValueStore> TrackerStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Saved endpoint base, `None` when unset or blank.
    pub fn endpoint(&self) -> Option<String> {
        self.store
            .get(ENDPOINT_KEY)
            .map(|raw| normalize_base_uri(&raw))
            .filter(|base| !base.is_empty())
    }

    /// Saves the normalized base, or removes the key when it normalizes to empty.
    pub fn save_endpoint(&mut self, raw: &str) -> Result<(), PersistError> {
        let base = normalize_base_uri(raw);
        if base.is_empty() {
            self.store.remove(ENDPOINT_KEY)
        } else {
            self.store.set(ENDPOINT_KEY, &base)
        }
    }

    /// Tracked ids in stored order, without duplicates. Unreadable data counts as empty.
    pub fn tracked_ids(&self) -> Vec<JobId> {
        let Some(raw) = self.store.get(TRACKED_KEY) else {
            return Vec::new();
        };
        let parsed: Vec<String> = match serde_json::from_str(&raw) {
            Ok(ids) => ids,
            Err(err) => {
                tracker_warn!("Ignoring unreadable tracked job list: {}", err);
                return Vec::new();
            }
        };

        let mut ids: Vec<JobId> = Vec::with_capacity(parsed.len());
        for raw_id in parsed {
            let job_id = JobId::new(raw_id);
            if !job_id.as_str().is_empty() && !ids.contains(&job_id) {
                ids.push(job_id);
            }
        }
        ids
    }

    /// Replaces the tracked set in one write.
    pub fn write_tracked(&mut self, job_ids: &[JobId]) -> Result<(), PersistError> {
        if job_ids.is_empty() {
            tracker_debug!("Clearing tracked job list");
            return self.store.remove(TRACKED_KEY);
        }
        let raw: Vec<&str> = job_ids.iter().map(JobId::as_str).collect();
        let encoded =
            serde_json::to_string(&raw).map_err(|err| PersistError::Encode(err.to_string()))?;
        tracker_debug!("Persisting tracked job list {}", encoded);
        self.store.set(TRACKED_KEY, &encoded)
    }
}
