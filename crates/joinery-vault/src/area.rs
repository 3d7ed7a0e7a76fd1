//! The [`StorageArea`] abstraction and its in-memory implementation.
//!
//! A storage area is a flat string-to-string map, the same shape as a browser
//! storage object. Joinery keeps two of them: a durable one that survives
//! process restarts ([`crate::store::SqliteArea`]) and an ephemeral one that
//! lives only as long as the current process ([`MemoryArea`]).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, VaultError};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A key-value storage area.
///
/// Implementations are internally synchronized so a single area can be shared
/// behind an `Arc` across tasks.
pub trait StorageArea: Send + Sync {
    /// Short name used in log fields and error messages.
    fn name(&self) -> &'static str;

    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently present, in no particular order.
    fn keys(&self) -> Result<Vec<String>>;

    /// Write several values as one unit.
    ///
    /// The default applies them one by one; backends with transactions
    /// override this so readers never observe a partial batch.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove several keys as one unit.
    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Whether a non-empty value is stored under `key`.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some_and(|v| !v.is_empty()))
    }
}

/// JSON helpers available on every [`StorageArea`].
pub trait StorageAreaExt: StorageArea {
    /// Read and deserialize a JSON value.
    ///
    /// Returns [`VaultError::Serialization`] if the stored text is not valid
    /// JSON for `T`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a JSON value.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<A: StorageArea + ?Sized> StorageAreaExt for A {}

// ---------------------------------------------------------------------------
// MemoryArea
// ---------------------------------------------------------------------------

/// Process-scoped storage area. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryArea {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryArea {
    /// Create an empty area.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| VaultError::LockPoisoned { area: "ephemeral" })
    }
}

impl StorageArea for MemoryArea {
    fn name(&self) -> &'static str {
        "ephemeral"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.lock()?;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
