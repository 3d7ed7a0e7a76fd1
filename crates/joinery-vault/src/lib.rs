//! Session storage areas for Joinery.
//!
//! Joinery keeps authentication artifacts in one of two key-value areas, the
//! same split a browser makes between local and session storage:
//!
//! - [`store::SqliteArea`]: durable, SQLite-backed, survives restarts.
//! - [`area::MemoryArea`]: ephemeral, lives for the current process only.
//!
//! [`tiers::TieredStorage`] owns one of each and is what higher layers hold.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use joinery_vault::{StorageArea, Tier, TieredStorage};
//!
//! # fn example() -> joinery_vault::Result<()> {
//! let storage = TieredStorage::open("data/session.db")?;
//! storage.area(Tier::Durable).set("auth_persistent", "true")?;
//! assert_eq!(storage.locate("auth_persistent")?, Some(Tier::Durable));
//! # Ok(())
//! # }
//! ```

pub mod area;
pub mod error;
pub mod store;
pub mod tiers;

pub use area::{MemoryArea, StorageArea, StorageAreaExt};
pub use error::{Result, VaultError};
pub use store::SqliteArea;
pub use tiers::{Tier, TieredStorage};
