use std::fs;

use tempfile::TempDir;
use tracker_core::JobId;
use tracker_engine::{
    ensure_output_dir, AtomicFileWriter, KeyValueStore, MemoryStore, TrackerStorage, ENDPOINT_KEY,
    TRACKED_KEY,
};

fn ids(raw: &[&str]) -> Vec<JobId> {
    raw.iter().map(|id| JobId::from(*id)).collect()
}

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("artifacts");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write_bytes("j1.zip", b"old").unwrap();
    assert_eq!(first.file_name().unwrap(), "j1.zip");

    let second = writer.write_bytes("j1.zip", b"new").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(&second).unwrap(), b"new");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("state.ron", "data").is_err());
    assert!(!file_path.with_file_name("state.ron").exists());
}

#[test]
fn tracked_ids_roundtrip_through_store() {
    let store = MemoryStore::new();
    let mut storage = TrackerStorage::new(store.clone());

    storage.write_tracked(&ids(&["j1", "j2"])).unwrap();

    assert_eq!(store.get(TRACKED_KEY).as_deref(), Some(r#"["j1","j2"]"#));
    assert_eq!(TrackerStorage::new(store).tracked_ids(), ids(&["j1", "j2"]));
}

#[test]
fn empty_tracked_set_removes_key() {
    let mut store = MemoryStore::new();
    store.set(TRACKED_KEY, r#"["j1"]"#).unwrap();
    let mut storage = TrackerStorage::new(store.clone());

    storage.write_tracked(&[]).unwrap();

    assert_eq!(store.get(TRACKED_KEY), None);
    assert!(storage.tracked_ids().is_empty());
}

#[test]
fn unreadable_or_duplicate_tracked_entries_are_tolerated() {
    let mut store = MemoryStore::new();
    let storage = TrackerStorage::new(store.clone());

    store.set(TRACKED_KEY, "not json").unwrap();
    assert!(storage.tracked_ids().is_empty());

    store.set(TRACKED_KEY, r#"["a","","b","a"]"#).unwrap();
    assert_eq!(storage.tracked_ids(), ids(&["a", "b"]));
}

#[test]
fn endpoint_is_normalized_and_blank_clears_it() {
    let store = MemoryStore::new();
    let mut storage = TrackerStorage::new(store.clone());
    assert_eq!(storage.endpoint(), None);

    storage.save_endpoint(" https://api.example.com/ ").unwrap();
    assert_eq!(store.get(ENDPOINT_KEY).as_deref(), Some("https://api.example.com"));
    assert_eq!(storage.endpoint().as_deref(), Some("https://api.example.com"));

    storage.save_endpoint("  ").unwrap();
    assert_eq!(store.get(ENDPOINT_KEY), None);
    assert_eq!(storage.endpoint(), None);
}
