//! Where organizations live once the wizard creates them.

use async_trait::async_trait;
use chrono::Utc;
use joinery_vault::{StorageAreaExt, TieredStorage};
use tokio::sync::Mutex;

use crate::error::{OnboardingError, Result};
use crate::models::{Organization, OrganizationDraft};

/// Durable key holding the JSON array of organizations.
pub const ORGANIZATIONS_KEY: &str = "organizations";

/// Organization persistence.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    /// Every organization known to this user.
    async fn list(&self) -> Result<Vec<Organization>>;

    /// Create an organization owned by `owner_id`.
    ///
    /// Fails with [`OnboardingError::NameTaken`] if the name is in use.
    async fn create(&self, draft: &OrganizationDraft, owner_id: &str) -> Result<Organization>;

    /// Whether no existing organization uses `name`, ignoring case and
    /// surrounding whitespace.
    async fn is_name_available(&self, name: &str) -> Result<bool> {
        let wanted = name.trim().to_lowercase();
        Ok(!self
            .list()
            .await?
            .iter()
            .any(|org| org.name.to_lowercase() == wanted))
    }
}

/// Directory kept in the durable storage area.
pub struct LocalDirectory {
    storage: TieredStorage,
    write_lock: Mutex<()>,
}

impl LocalDirectory {
    pub fn new(storage: TieredStorage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Organization>> {
        Ok(self
            .storage
            .durable()
            .get_json::<Vec<Organization>>(ORGANIZATIONS_KEY)?
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrganizationDirectory for LocalDirectory {
    async fn list(&self) -> Result<Vec<Organization>> {
        self.load()
    }

    async fn create(&self, draft: &OrganizationDraft, owner_id: &str) -> Result<Organization> {
        let _guard = self.write_lock.lock().await;
        let mut orgs = self.load()?;

        let name = draft.name.trim().to_string();
        let wanted = name.to_lowercase();
        if orgs.iter().any(|org| org.name.to_lowercase() == wanted) {
            return Err(OnboardingError::NameTaken { name });
        }

        let now = Utc::now();
        let description = draft.description.trim();
        let org = Organization {
            id: uuid::Uuid::now_v7().to_string(),
            name,
            description: (!description.is_empty()).then(|| description.to_string()),
            owner_id: owner_id.to_string(),
            auth_provider: draft.auth_provider.clone(),
            created_at: now,
            updated_at: now,
        };
        orgs.push(org.clone());
        self.storage.durable().set_json(ORGANIZATIONS_KEY, &orgs)?;

        tracing::info!(org_id = %org.id, name = %org.name, "organization created");
        Ok(org)
    }
}

impl std::fmt::Debug for LocalDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDirectory")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
