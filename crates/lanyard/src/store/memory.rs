//! In-memory storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::Result;

use super::{Storage, StoredEntry};

/// A mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        // Poisoning still leaves a usable map of plain values.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self.entries().get(key).cloned())
    }

    fn store(&self, entries: &[(&str, StoredEntry)]) -> Result<()> {
        let mut map = self.entries();
        for (key, entry) in entries {
            map.insert((*key).to_string(), entry.clone());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.entries();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load_remove() {
        let storage = MemoryStorage::new();
        storage
            .store(&[("a", StoredEntry::new("1", None)), ("b", StoredEntry::new("2", None))])
            .unwrap();

        assert_eq!(storage.load("a").unwrap().unwrap().value, "1");

        storage.remove(&["a", "missing"]).unwrap();
        assert!(storage.load("a").unwrap().is_none());
        assert_eq!(storage.load("b").unwrap().unwrap().value, "2");
    }
}
