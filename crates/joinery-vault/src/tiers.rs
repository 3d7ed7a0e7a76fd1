//! Durable/ephemeral pair of storage areas.
//!
//! [`TieredStorage`] owns exactly one durable and one ephemeral
//! [`StorageArea`]. Callers address an area by [`Tier`] and can clear a set of
//! keys from both at once.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::area::{MemoryArea, StorageArea};
use crate::error::Result;
use crate::store::SqliteArea;

/// Which of the two storage areas a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Survives process restarts.
    Durable,
    /// Lives only as long as the current process.
    Ephemeral,
}

impl Tier {
    /// Pick the tier for a "remember me" choice.
    pub fn for_persistence(persistent: bool) -> Self {
        if persistent {
            Self::Durable
        } else {
            Self::Ephemeral
        }
    }

    /// The opposite tier.
    pub fn other(self) -> Self {
        match self {
            Self::Durable => Self::Ephemeral,
            Self::Ephemeral => Self::Durable,
        }
    }

    /// Both tiers, durable first.
    pub fn all() -> [Tier; 2] {
        [Self::Durable, Self::Ephemeral]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two storage areas used for session state.
///
/// Cheap to clone; clones share the same underlying areas.
#[derive(Clone)]
pub struct TieredStorage {
    durable: Arc<dyn StorageArea>,
    ephemeral: Arc<dyn StorageArea>,
}

impl TieredStorage {
    /// Build from two arbitrary areas.
    pub fn new(durable: Arc<dyn StorageArea>, ephemeral: Arc<dyn StorageArea>) -> Self {
        Self { durable, ephemeral }
    }

    /// Durable SQLite area at `path` plus a fresh in-memory ephemeral area.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let durable = SqliteArea::open(path)?;
        Ok(Self::new(Arc::new(durable), Arc::new(MemoryArea::new())))
    }

    /// Both areas in memory (useful for testing).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArea::new()), Arc::new(MemoryArea::new()))
    }

    /// The area for `tier`.
    pub fn area(&self, tier: Tier) -> &dyn StorageArea {
        match tier {
            Tier::Durable => self.durable.as_ref(),
            Tier::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    pub fn durable(&self) -> &dyn StorageArea {
        self.durable.as_ref()
    }

    pub fn ephemeral(&self) -> &dyn StorageArea {
        self.ephemeral.as_ref()
    }

    /// The first tier (durable first) holding a non-empty value for `key`.
    pub fn locate(&self, key: &str) -> Result<Option<Tier>> {
        for tier in Tier::all() {
            if self.area(tier).contains(key)? {
                return Ok(Some(tier));
            }
        }
        Ok(None)
    }

    /// Remove `keys` from both areas.
    pub fn clear_keys(&self, keys: &[&str]) -> Result<()> {
        for tier in Tier::all() {
            self.area(tier).remove_many(keys)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TieredStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredStorage")
            .field("durable", &self.durable.name())
            .field("ephemeral", &self.ephemeral.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
