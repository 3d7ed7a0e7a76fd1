//! Demo/mock authentication.
//!
//! When no identity provider is configured, or the backend cannot be reached
//! during a callback, Joinery signs in a fixed mock user so the rest of the
//! application stays usable without a server.

use chrono::DateTime;
use joinery_vault::{StorageArea, Tier, TieredStorage};

use crate::error::Result;
use crate::types::{User, keys};

/// 2024-01-15T00:00:00Z
const MOCK_USER_CREATED_AT: i64 = 1_705_276_800;

/// Demo-mode flag bookkeeping.
#[derive(Debug, Clone)]
pub struct DemoAuth {
    storage: TieredStorage,
}

impl DemoAuth {
    pub fn new(storage: TieredStorage) -> Self {
        Self { storage }
    }

    /// The fixed demo user.
    pub fn mock_user() -> User {
        User {
            id: "1".to_string(),
            email: "john.doe@example.com".to_string(),
            name: "John Doe".to_string(),
            avatar: Some("https://github.com/johndoe.png".to_string()),
            created_at: DateTime::from_timestamp(MOCK_USER_CREATED_AT, 0).unwrap_or_default(),
        }
    }

    /// Set the demo flag in the chosen area, clear it from the other, and
    /// return the mock user.
    pub fn perform_mock_login(&self, persistent: bool) -> Result<User> {
        let tier = Tier::for_persistence(persistent);
        let flag = persistent.to_string();

        self.storage
            .area(tier)
            .set_many(&[(keys::DEMO_AUTH, "true"), (keys::AUTH_PERSISTENT, flag.as_str())])?;
        self.storage
            .area(tier.other())
            .remove_many(&[keys::DEMO_AUTH, keys::AUTH_PERSISTENT])?;

        tracing::info!(tier = %tier, "demo login performed");
        Ok(Self::mock_user())
    }

    /// Whether the demo flag is set in either area.
    pub fn is_demo_authentication(&self) -> Result<bool> {
        for tier in Tier::all() {
            if self.storage.area(tier).get(keys::DEMO_AUTH)?.as_deref() == Some("true") {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
