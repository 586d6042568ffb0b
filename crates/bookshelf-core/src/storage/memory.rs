//! In-memory key-value store
//!
//! Used for tests and sessions that should leave nothing behind. An
//! optional quota makes writes fail the way a full browser storage area
//! would.

use std::collections::HashMap;

use super::error::{StorageError, StorageResult};
use super::{validate_key, KeyValueStore};

/// Key-value store held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    quota: Option<usize>,
    fail_writes: bool,
    fail_reads: bool,
}

impl MemoryStore {
    /// Create an empty store without a quota
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that holds at most `bytes` of keys and values
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Make every subsequent `set` fail (or succeed again)
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every subsequent `get` fail (or succeed again)
    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bytes used by keys and values
    pub fn used_bytes(&self) -> usize {
        self.values.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        if self.fail_reads {
            return Err(StorageError::Injected {
                key: key.to_string(),
                operation: "Read",
            });
        }
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;

        if self.fail_writes {
            return Err(StorageError::Injected {
                key: key.to_string(),
                operation: "Write",
            });
        }

        if let Some(quota) = self.quota {
            let replaced = self.values.get(key).map_or(0, |old| key.len() + old.len());
            let needed = self.used_bytes() - replaced + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.values.remove(key);
        Ok(())
    }
}
