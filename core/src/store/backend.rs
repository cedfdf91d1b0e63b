// Storage abstraction for cross-platform persistence
//
// The store only ever needs "get/set/remove a string by key". Browsers back this
// with localStorage (see the wasm crate), native hosts with sled, tests with memory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors a storage backend can report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded ({used} of {limit} bytes)")]
    QuotaExceeded { used: usize, limit: usize },

    #[error("Storage I/O error: {0}")]
    Io(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Unified key/value trait for cross-platform draft persistence
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> BackendResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> BackendResult<()>;
    fn remove(&self, key: &str) -> BackendResult<()>;
    fn keys_with_prefix(&self, prefix: &str) -> BackendResult<Vec<String>>;
    fn flush(&self) -> BackendResult<()>;
}

impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        (**self).remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }

    fn flush(&self) -> BackendResult<()> {
        (**self).flush()
    }
}

/// In-memory storage useful for testing and hosts without persistence.
///
/// An optional byte quota makes writes fail the way a full browser store does.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes once keys plus values would exceed `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently held (keys + values)
    pub fn used_bytes(&self) -> usize {
        self.data
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut data = self.data.write();
        if let Some(limit) = self.quota_bytes {
            let replaced = data.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let current: usize = data.iter().map(|(k, v)| k.len() + v.len()).sum();
            let used = current - replaced + key.len() + value.len();
            if used > limit {
                return Err(BackendError::QuotaExceeded { used, limit });
            }
        }
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn flush(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub struct SledStorage {
    db: sled::Db,
}

#[cfg(not(target_arch = "wasm32"))]
impl SledStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> BackendResult<Self> {
        let db = sled::open(path).map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl StorageBackend for SledStorage {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| BackendError::Io(e.to_string()))?;
        value
            .map(|ivec| {
                String::from_utf8(ivec.to_vec()).map_err(|e| BackendError::Io(e.to_string()))
            })
            .transpose()
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item.map_err(|e| BackendError::Io(e.to_string()))?;
            keys.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(keys)
    }

    fn flush(&self) -> BackendResult<()> {
        self.db
            .flush()
            .map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_get_remove() {
        let storage = MemoryStorage::new();
        storage.set("a", "1").unwrap();
        assert_eq!(storage.get("a").unwrap(), Some("1".to_string()));

        storage.set("a", "2").unwrap();
        assert_eq!(storage.get("a").unwrap(), Some("2".to_string()));

        storage.remove("a").unwrap();
        assert_eq!(storage.get("a").unwrap(), None);
        // Removing a missing key is fine
        storage.remove("a").unwrap();
    }

    #[test]
    fn test_memory_prefix_scan() {
        let storage = MemoryStorage::new();
        storage.set("company_draft_b", "{}").unwrap();
        storage.set("company_draft_a", "{}").unwrap();
        storage.set("retry_queue", "[]").unwrap();

        let keys = storage.keys_with_prefix("company_draft_").unwrap();
        assert_eq!(keys, vec!["company_draft_a", "company_draft_b"]);
    }

    #[test]
    fn test_memory_quota() {
        let storage = MemoryStorage::with_quota(10);
        storage.set("k", "12345").unwrap();
        // Overwrite frees the old value first
        storage.set("k", "123456789").unwrap();

        let err = storage.set("other", "x").unwrap_err();
        assert!(matches!(err, BackendError::QuotaExceeded { limit: 10, .. }));
        assert_eq!(storage.used_bytes(), 10);
    }

    #[test]
    fn test_sled_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path().join("store")).unwrap();

        storage.set("company_draft_acc-1", "{\"timestamp\":1}").unwrap();
        storage.set("retry_queue", "[]").unwrap();
        storage.flush().unwrap();

        assert_eq!(
            storage.get("company_draft_acc-1").unwrap().as_deref(),
            Some("{\"timestamp\":1}")
        );
        assert_eq!(
            storage.keys_with_prefix("company_draft_").unwrap(),
            vec!["company_draft_acc-1"]
        );

        storage.remove("retry_queue").unwrap();
        assert!(storage.get("retry_queue").unwrap().is_none());
    }
}
