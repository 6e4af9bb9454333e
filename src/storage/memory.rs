//! In-memory backend

use super::traits::{KvBackend, StorageError, StorageResult, DEFAULT_CAPACITY_BYTES};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// HashMap-style backend with the same quota accounting as SQLite.
///
/// Used by tests and by runs that should not touch disk.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
    capacity: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY_BYTES)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            capacity,
        }
    }

    fn entry_size(key: &str, value: &str) -> u64 {
        (key.len() + value.len()) as u64
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let used: u64 = entries.iter().map(|(k, v)| Self::entry_size(k, v)).sum();
        let existing = entries.get(key).map(|v| Self::entry_size(key, v)).unwrap_or(0);
        let needed = Self::entry_size(key, value);
        let available = self.capacity.saturating_sub(used - existing);
        if needed > available {
            return Err(StorageError::QuotaExceeded { needed, available });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn remove_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }

    fn bytes_in_use(&self) -> StorageResult<u64> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| Self::entry_size(k, v))
            .sum())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let backend = MemoryBackend::new();
        backend.set("a:1", "one").unwrap();
        assert_eq!(backend.get("a:1").unwrap().as_deref(), Some("one"));
        assert!(backend.remove("a:1").unwrap());
        assert!(!backend.remove("a:1").unwrap());
        assert_eq!(backend.get("a:1").unwrap(), None);
    }

    #[test]
    fn over_capacity_write_keeps_previous_value() {
        let backend = MemoryBackend::with_capacity(20);
        backend.set("k", "small").unwrap();
        let err = backend.set("k", &"x".repeat(50)).unwrap_err();
        assert!(err.is_quota());
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn replacing_a_value_only_counts_the_difference() {
        let backend = MemoryBackend::with_capacity(12);
        backend.set("k", "0123456789").unwrap();
        backend.set("k", "9876543210").unwrap();
        assert_eq!(backend.bytes_in_use().unwrap(), 11);
    }

    #[test]
    fn prefix_operations() {
        let backend = MemoryBackend::new();
        backend.set("annotations:a", "[]").unwrap();
        backend.set("annotations:b", "[]").unwrap();
        backend.set("drawings:a", "{}").unwrap();
        assert_eq!(
            backend.keys_with_prefix("annotations:").unwrap(),
            vec!["annotations:a".to_string(), "annotations:b".to_string()]
        );
        assert_eq!(backend.remove_prefix("annotations:").unwrap(), 2);
        assert_eq!(backend.keys_with_prefix("").unwrap(), vec!["drawings:a".to_string()]);
    }
}
