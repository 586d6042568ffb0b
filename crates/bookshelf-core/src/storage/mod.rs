//! Storage layer
//!
//! A small synchronous key-value store for string values, the durable
//! backing of the library.
//!
//! ## Backends
//!
//! - **FileStore**: one file per key in the data directory, written atomically
//! - **MemoryStore**: in-process map with an optional size quota, for tests
//!   and ephemeral sessions
//!
//! Stores are exclusively owned by one library; no locking is done.

pub mod error;
pub mod file;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;

/// Durable string storage with synchronous get/set/remove
pub trait KeyValueStore {
    /// Read the value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`
    fn set(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete the value stored under `key`; removing an absent key is not an error
    fn remove(&mut self, key: &str) -> StorageResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

/// Check that a key is safe to use as a file name
///
/// Allowed: ASCII alphanumerics, `.`, `-` and `_`, not starting with `.`.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    }
}
