//! The organization setup wizard.
//!
//! [`WizardStore`] holds the draft in a `watch` channel so views can follow
//! it, and owns the navigation rules:
//!
//! ```text
//!   1 Organization ──► 2 Repositories ──► 3 Team ──► 4 Settings ──► 5 Review
//!        required          optional        optional     required     complete()
//! ```
//!
//! Moving forward requires the current step to be valid. Jumping is allowed
//! backwards, or forwards once every required step in between is done.
//! `complete()` creates the organization exactly once.

use joinery_vault::TieredStorage;
use tokio::sync::{Mutex, watch};

use crate::directory::OrganizationDirectory;
use crate::error::{OnboardingError, Result};
use crate::flags::OnboardingFlags;
use crate::models::{
    GitHubRepository, Organization, OrganizationPatch, SettingsPatch, TOTAL_STEPS,
    TeamInvitation, WizardData, WizardStep,
};
use crate::validation::Validator;

pub struct WizardStore {
    data: watch::Sender<Option<WizardData>>,
    validator: Validator,
    flags: OnboardingFlags,
    completing: Mutex<()>,
}

impl WizardStore {
    pub fn new(storage: TieredStorage) -> Result<Self> {
        Ok(Self {
            data: watch::Sender::new(None),
            validator: Validator::new()?,
            flags: OnboardingFlags::new(storage),
            completing: Mutex::new(()),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<WizardData>> {
        self.data.subscribe()
    }

    pub fn data(&self) -> Option<WizardData> {
        self.data.borrow().clone()
    }

    pub fn flags(&self) -> &OnboardingFlags {
        &self.flags
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Start a fresh draft, discarding any previous one.
    pub fn initialize(&self) -> WizardData {
        let data = WizardData::default();
        self.data.send_replace(Some(data.clone()));
        tracing::debug!("setup wizard initialized");
        data
    }

    /// Drop the draft.
    pub fn cancel(&self) {
        if self.data.send_replace(None).is_some() {
            tracing::info!("setup wizard cancelled");
        }
    }

    // -- step data ----------------------------------------------------------

    pub fn patch_organization(&self, patch: OrganizationPatch) -> Result<()> {
        self.update(|data| {
            let org = &mut data.organization;
            if let Some(name) = patch.name {
                org.name = name;
            }
            if let Some(description) = patch.description {
                org.description = description;
            }
            if let Some(provider) = patch.auth_provider {
                org.auth_provider = provider;
            }
            Ok(())
        })
    }

    pub fn set_repositories(&self, repositories: Vec<GitHubRepository>) -> Result<()> {
        self.update(|data| {
            data.repositories = repositories;
            Ok(())
        })
    }

    /// Replace the invitation list. Rows without an email are dropped.
    pub fn set_team_members(&self, members: Vec<TeamInvitation>) -> Result<()> {
        let members = Validator::normalize_invitations(members);
        self.update(|data| {
            data.team_members = members;
            Ok(())
        })
    }

    pub fn patch_settings(&self, patch: SettingsPatch) -> Result<()> {
        self.update(|data| {
            let settings = &mut data.settings;
            if let Some(visibility) = patch.default_query_visibility {
                settings.default_query_visibility = visibility;
            }
            if let Some(allow) = patch.allow_repository_integration {
                settings.allow_repository_integration = allow;
            }
            if let Some(require) = patch.require_approval_for_queries {
                settings.require_approval_for_queries = require;
            }
            if let Some(audit) = patch.enable_audit_logging {
                settings.enable_audit_logging = audit;
            }
            Ok(())
        })
    }

    // -- navigation ---------------------------------------------------------

    /// Jump to `step`. Returns the new current step.
    pub fn go_to_step(&self, step: u8) -> Result<u8> {
        self.update(|data| {
            let target = WizardStep::from_number(step).ok_or(OnboardingError::InvalidStep { step })?;
            if step > data.current_step && !data.can_access(target) {
                return Err(OnboardingError::InvalidStep { step });
            }
            data.current_step = step;
            Ok(step)
        })
    }

    /// Mark the current step done and move to the next one.
    pub fn next_step(&self) -> Result<u8> {
        self.update(|data| {
            let current = data.current_step;
            let valid = data.current().is_some_and(|s| data.is_step_valid(s));
            if current >= TOTAL_STEPS || !valid {
                return Err(OnboardingError::InvalidStep { step: current + 1 });
            }
            data.completed_steps.insert(current);
            data.current_step = current + 1;
            Ok(data.current_step)
        })
    }

    /// Go back one step. Staying on the first step is not an error.
    pub fn previous_step(&self) -> Result<u8> {
        self.update(|data| {
            if data.current_step > 1 {
                data.current_step -= 1;
            }
            Ok(data.current_step)
        })
    }

    /// Move past an optional step without filling it in.
    pub fn skip_step(&self) -> Result<u8> {
        self.update(|data| {
            let current = data.current_step;
            if !data.current().is_some_and(WizardStep::is_optional) {
                return Err(OnboardingError::InvalidStep { step: current });
            }
            data.completed_steps.insert(current);
            data.current_step = current + 1;
            Ok(data.current_step)
        })
    }

    pub fn can_complete(&self) -> bool {
        self.data
            .borrow()
            .as_ref()
            .is_some_and(WizardData::can_complete)
    }

    // -- completion ---------------------------------------------------------

    /// Validate the draft and create the organization.
    ///
    /// Succeeds once per draft. Later calls return [`OnboardingError::NoDraft`].
    pub async fn complete(
        &self,
        directory: &dyn OrganizationDirectory,
        owner_id: &str,
    ) -> Result<Organization> {
        let _guard = self.completing.lock().await;

        let data = match self.data() {
            Some(data) if !data.completed => data,
            _ => return Err(OnboardingError::NoDraft),
        };
        if !data.can_complete() {
            return Err(OnboardingError::InvalidStep {
                step: data.current_step,
            });
        }

        let mut issues = self.validator.validate_organization(&data.organization);
        issues.extend(self.validator.validate_invitations(&data.team_members));
        if !issues.is_empty() {
            return Err(OnboardingError::Validation { issues });
        }

        let org = directory.create(&data.organization, owner_id).await?;

        self.data.send_modify(|slot| {
            if let Some(data) = slot {
                data.completed = true;
                data.completed_steps.insert(TOTAL_STEPS);
            }
        });
        self.flags.mark_setup_complete()?;

        tracing::info!(
            org_id = %org.id,
            repositories = data.repositories.len(),
            invitations = data.team_members.len(),
            "setup wizard completed"
        );
        Ok(org)
    }

    /// Apply `f` to the open draft. Nothing is published if `f` fails.
    fn update<R>(&self, f: impl FnOnce(&mut WizardData) -> Result<R>) -> Result<R> {
        let mut outcome = Err(OnboardingError::NoDraft);
        self.data.send_if_modified(|slot| match slot {
            Some(data) if !data.completed => {
                let mut draft = data.clone();
                outcome = f(&mut draft);
                let changed = outcome.is_ok() && draft != *data;
                if changed {
                    *data = draft;
                }
                changed
            }
            _ => false,
        });
        outcome
    }
}

impl std::fmt::Debug for WizardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardStore")
            .field("data", &*self.data.borrow())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
