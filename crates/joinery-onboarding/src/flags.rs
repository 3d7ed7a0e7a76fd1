//! First-time-user flags kept in the durable storage area.

use joinery_vault::{StorageArea, TieredStorage};

use crate::directory::OrganizationDirectory;
use crate::error::Result;

pub const SETUP_COMPLETE_KEY: &str = "userHasCompletedSetup";
pub const REDIRECT_KEY: &str = "postSetupRedirectUrl";

pub const DEFAULT_REDIRECT: &str = "/dashboard";
pub const SETUP_ROUTE: &str = "/organizations/setup";

#[derive(Debug, Clone)]
pub struct OnboardingFlags {
    storage: TieredStorage,
}

impl OnboardingFlags {
    pub fn new(storage: TieredStorage) -> Self {
        Self { storage }
    }

    pub fn has_completed_setup(&self) -> Result<bool> {
        Ok(self.storage.durable().get(SETUP_COMPLETE_KEY)?.as_deref() == Some("true"))
    }

    pub fn mark_setup_complete(&self) -> Result<()> {
        self.storage.durable().set(SETUP_COMPLETE_KEY, "true")?;
        tracing::debug!("setup marked complete");
        Ok(())
    }

    /// Remember where to go once setup finishes.
    ///
    /// The root, the setup route itself and empty URLs are not remembered.
    pub fn remember_redirect(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() || url == "/" || url == SETUP_ROUTE {
            return Ok(());
        }
        self.storage.durable().set(REDIRECT_KEY, url)?;
        Ok(())
    }

    /// The remembered redirect, removed as it is read.
    pub fn take_redirect(&self) -> Result<String> {
        let area = self.storage.durable();
        let url = area.get(REDIRECT_KEY)?.filter(|u| !u.is_empty());
        area.remove(REDIRECT_KEY)?;
        Ok(url.unwrap_or_else(|| DEFAULT_REDIRECT.to_string()))
    }

    /// Whether a signed-in user should be sent to the setup wizard.
    pub async fn needs_setup(
        &self,
        authenticated: bool,
        directory: &dyn OrganizationDirectory,
    ) -> Result<bool> {
        if !authenticated || self.has_completed_setup()? {
            return Ok(false);
        }
        Ok(directory.list().await?.is_empty())
    }

    pub fn reset(&self) -> Result<()> {
        self.storage
            .durable()
            .remove_many(&[SETUP_COMPLETE_KEY, REDIRECT_KEY])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
