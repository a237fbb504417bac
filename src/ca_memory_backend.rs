// In-memory node storage
//
// Simple, fast key-value storage for one simulated node using an
// insertion-ordered map. Ideal for testing and for runs where the issued
// certificates do not need to survive the process.
//
// For on-disk storage, see ca_file_backend.rs

use indexmap::IndexMap;

use crate::ca_interface::{validate_key, NodeStore, StorageError};

/// In-memory storage for a single node
///
/// # Example
/// ```rust
/// use dpki_sim::ca_interface::NodeStore;
/// use dpki_sim::ca_memory_backend::MemoryStore;
///
/// let mut store = MemoryStore::new();
/// store.put("share.json", b"{}").unwrap();
/// assert_eq!(store.get("share.json").unwrap().as_deref(), Some(&b"{}"[..]));
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: IndexMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.entries.shift_remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.keys().cloned().collect())
    }
}
