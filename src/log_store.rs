//! ==============================================================================
//! log_store.rs - persisted, bounded, deduplicated alert log
//! ==============================================================================
//!
//! purpose:
//!     keeps the last 50 alert transitions across restarts.
//!     the log is a json array of strings stored under one bucket key in a
//!     key-value store. each entry reads "{timestamp}: {message}".
//!
//! failure model:
//!     - reads fail open: a missing, unreadable or corrupt bucket is an empty log
//!     - writes fail loud: StoreError goes back to the caller, who treats it as
//!       fatal. a half-written log is never guessed at.
//!
//! relationships:
//!     - used by: alerts.rs (appends on edges), session.rs (clear / load)
//!     - stores: the alert detector's active set under "{bucket}_active"
//!
//! ==============================================================================

use crate::domain::{DeviceId, DISPLAY_TIME_FORMAT};

use chrono::{DateTime, Local};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_LOG_KEY: &str = "lora_alert_log";

/// Hard upper bound on retained entries.
pub const MAX_ENTRIES: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ==============================================================================
// key-value backends
// ==============================================================================

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn put(&mut self, key: &str, value: &str) -> io::Result<()>;
    /// Removing a key that does not exist is not an error.
    fn remove(&mut self, key: &str) -> io::Result<()>;
}

/// One `{key}.json` file per key under a data directory.
///
/// `put` writes a sibling temp file and renames it over the target, so a
/// reader never sees a partially written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> io::Result<()> {
        let target = self.path_for(key);
        let staging = target.with_extension("json.tmp");
        std::fs::write(&staging, value)?;
        std::fs::rename(&staging, &target)
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

// ==============================================================================
// alert log
// ==============================================================================

pub struct AlertLog<S> {
    store: S,
    key: String,
    capacity: usize,
}

impl<S: KeyValueStore> AlertLog<S> {
    pub fn new(store: S, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            store,
            key: key.into(),
            capacity: capacity.clamp(1, MAX_ENTRIES),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The persisted log, oldest first. Never fails.
    pub fn load(&self) -> Vec<String> {
        self.read_json(&self.key).unwrap_or_default()
    }

    pub fn save(&mut self, entries: &[String]) -> Result<(), StoreError> {
        let key = self.key.clone();
        self.write_json(&key, &entries)
    }

    /// Append `"{now}: {message}"` unless it equals the last entry.
    ///
    /// Returns whether the log changed.
    pub fn append(&mut self, device: DeviceId, message: &str) -> Result<bool, StoreError> {
        self.append_at(Local::now(), device, message)
    }

    pub fn append_at(
        &mut self,
        now: DateTime<Local>,
        device: DeviceId,
        message: &str,
    ) -> Result<bool, StoreError> {
        let entry = format!("{}: {}", now.format(DISPLAY_TIME_FORMAT), message);
        let mut entries = self.load();
        if entries.last() == Some(&entry) {
            debug!(device = %device, "Skipping repeated log entry.");
            return Ok(false);
        }
        entries.push(entry);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        self.save(&entries)?;
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        let key = self.key.clone();
        self.store.remove(&key).map_err(|source| StoreError::Io { key, source })
    }

    // --------------------------------------------------------------------------
    // alert detector state, kept next to the log it explains
    // --------------------------------------------------------------------------

    pub fn state_key(&self) -> String {
        format!("{}_active", self.key)
    }

    pub fn load_alert_state(&self) -> BTreeSet<DeviceId> {
        self.read_json(&self.state_key()).unwrap_or_default()
    }

    pub fn save_alert_state(&mut self, active: &BTreeSet<DeviceId>) -> Result<(), StoreError> {
        let key = self.state_key();
        self.write_json(&key, active)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = match self.store.get(key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted value, treating as empty.");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Persisted value is corrupt, treating as empty.");
                None
            }
        }
    }

    fn write_json<T: serde::Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.put(key, &text).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 21, 5, secs).unwrap()
    }

    fn memory_log() -> AlertLog<MemoryStore> {
        AlertLog::new(MemoryStore::default(), DEFAULT_LOG_KEY, MAX_ENTRIES)
    }

    /// Accepts reads, refuses writes.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> io::Result<Option<String>> {
            Ok(None)
        }
        fn put(&mut self, _key: &str, _value: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
        fn remove(&mut self, _key: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[test]
    fn test_entry_format() {
        let mut log = memory_log();
        assert!(log.append_at(at(7), DeviceId::P1, "P1 Alert CLEARED").unwrap());
        assert_eq!(log.load(), vec!["3/14/2026, 9:05:07 PM: P1 Alert CLEARED".to_string()]);
    }

    #[test]
    fn test_immediate_repeat_is_deduplicated() {
        let mut log = memory_log();
        assert!(log.append_at(at(1), DeviceId::P1, "same").unwrap());
        assert!(!log.append_at(at(1), DeviceId::P1, "same").unwrap());
        assert_eq!(log.load().len(), 1);

        assert!(log.append_at(at(1), DeviceId::P2, "other").unwrap());
        assert!(log.append_at(at(1), DeviceId::P1, "same").unwrap());
        let entries = log.load();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], entries[2]);
    }

    #[test]
    fn test_same_message_different_second_is_kept() {
        let mut log = memory_log();
        assert!(log.append_at(at(1), DeviceId::P1, "same").unwrap());
        assert!(log.append_at(at(2), DeviceId::P1, "same").unwrap());
        assert_eq!(log.load().len(), 2);
    }

    #[test]
    fn test_bounded_fifo_eviction() {
        let mut log = memory_log();
        for i in 0..120 {
            log.append_at(at(0), DeviceId::P1, &format!("entry {i}")).unwrap();
            assert!(log.load().len() <= MAX_ENTRIES);
        }
        let entries = log.load();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert!(entries[0].ends_with("entry 70"));
        assert!(entries[49].ends_with("entry 119"));
    }

    #[test]
    fn test_capacity_is_clamped() {
        let log = AlertLog::new(MemoryStore::default(), "k", 500);
        assert_eq!(log.capacity(), MAX_ENTRIES);
        let log = AlertLog::new(MemoryStore::default(), "k", 0);
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn test_corrupt_log_fails_open() {
        let mut store = MemoryStore::default();
        store.put(DEFAULT_LOG_KEY, "{not json").unwrap();
        let mut log = AlertLog::new(store, DEFAULT_LOG_KEY, MAX_ENTRIES);
        assert!(log.load().is_empty());
        assert!(log.append_at(at(3), DeviceId::P2, "fresh").unwrap());
        assert_eq!(log.load().len(), 1);
    }

    #[test]
    fn test_null_log_fails_open() {
        let mut store = MemoryStore::default();
        store.put(DEFAULT_LOG_KEY, "null").unwrap();
        let log = AlertLog::new(store, DEFAULT_LOG_KEY, MAX_ENTRIES);
        assert!(log.load().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut log = memory_log();
        log.append_at(at(0), DeviceId::P1, "a").unwrap();
        log.clear().unwrap();
        assert!(log.load().is_empty());
        log.clear().unwrap();
    }

    #[test]
    fn test_write_failure_propagates() {
        let mut log = AlertLog::new(ReadOnlyStore, DEFAULT_LOG_KEY, MAX_ENTRIES);
        let err = log.append_at(at(0), DeviceId::P1, "lost").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(log.clear().is_err());
    }

    #[test]
    fn test_file_store_roundtrip_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AlertLog::new(FileStore::open(dir.path()).unwrap(), DEFAULT_LOG_KEY, MAX_ENTRIES);
        log.append_at(at(0), DeviceId::P1, "first").unwrap();
        log.append_at(at(0), DeviceId::P1, "second").unwrap();

        // a fresh handle on the same directory sees the same log
        let reopened = AlertLog::new(FileStore::open(dir.path()).unwrap(), DEFAULT_LOG_KEY, MAX_ENTRIES);
        assert_eq!(reopened.load().len(), 2);
        assert!(!dir.path().join("lora_alert_log.json.tmp").exists());

        log.clear().unwrap();
        assert!(!dir.path().join("lora_alert_log.json").exists());
        assert!(reopened.load().is_empty());
    }

    #[test]
    fn test_file_store_corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lora_alert_log.json"), b"\xff\xfe garbage").unwrap();
        let log = AlertLog::new(FileStore::open(dir.path()).unwrap(), DEFAULT_LOG_KEY, MAX_ENTRIES);
        assert!(log.load().is_empty());
    }

    #[test]
    fn test_file_store_sanitises_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.path_for("../escape"), dir.path().join("___escape.json"));
    }

    #[test]
    fn test_alert_state_roundtrip() {
        let mut log = memory_log();
        assert!(log.load_alert_state().is_empty());
        let active: BTreeSet<DeviceId> = [DeviceId::P2].into_iter().collect();
        log.save_alert_state(&active).unwrap();
        assert_eq!(log.load_alert_state(), active);
        assert_eq!(log.state_key(), "lora_alert_log_active");
    }
}
