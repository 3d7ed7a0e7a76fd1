//! Vault error types.
//!
//! Both storage areas surface errors through [`VaultError`], the single error
//! type returned by every public API in this crate.

/// Unified error type for the Joinery storage areas.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database schema migration failed.
    #[error("migration failed: {reason}")]
    MigrationFailed { reason: String },

    /// A stored value could not be (de)serialized as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding an area's lock.
    #[error("storage lock poisoned: {area}")]
    LockPoisoned { area: &'static str },
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
