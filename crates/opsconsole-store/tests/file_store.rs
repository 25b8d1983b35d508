use std::fs;
use std::sync::Arc;
use std::time::Duration;

use opsconsole_store::{FileBackend, PersistentStore};

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let backend = Arc::new(FileBackend::new(dir.path()).unwrap());
        let store = PersistentStore::new(backend, "opsconsole", Duration::from_secs(300));
        store.set_cached_data("window", &60u32).unwrap();
    }

    let backend = Arc::new(FileBackend::new(dir.path()).unwrap());
    let store = PersistentStore::new(backend, "opsconsole", Duration::from_secs(300));
    assert!(store.is_cache_valid("window"));
    assert_eq!(store.get_cached_data("window", 0u32), 60);
}

#[test]
fn truncated_file_is_removed_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("opsconsole.logs.json");
    fs::write(&path, r#"{"data":[{"id":"a""#).unwrap();

    let backend = Arc::new(FileBackend::new(dir.path()).unwrap());
    let store = PersistentStore::new(backend, "opsconsole", Duration::from_secs(300));

    assert!(!store.is_cache_valid("logs"));
    assert!(!path.exists());
}
