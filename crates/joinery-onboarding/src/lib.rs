//! First-time setup for Joinery.
//!
//! A user who signs in without belonging to any organization is sent through
//! a five-step wizard that creates one:
//!
//! - [`wizard::WizardStore`]: the draft, step navigation and completion.
//! - [`validation::Validator`]: field checks run before anything is created.
//! - [`directory::OrganizationDirectory`]: where organizations are stored.
//! - [`flags::OnboardingFlags`]: the "setup done" flag and the post-setup
//!   redirect.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use joinery_onboarding::{LocalDirectory, OrganizationPatch, WizardStore};
//! use joinery_vault::TieredStorage;
//!
//! # async fn example() -> joinery_onboarding::Result<()> {
//! let storage = TieredStorage::open("data/session.db")?;
//! let directory = LocalDirectory::new(storage.clone());
//! let wizard = WizardStore::new(storage)?;
//!
//! wizard.initialize();
//! wizard.patch_organization(OrganizationPatch {
//!     name: Some("Acme".into()),
//!     ..Default::default()
//! })?;
//! wizard.next_step()?;
//! wizard.skip_step()?;
//! wizard.skip_step()?;
//! wizard.next_step()?;
//! let org = wizard.complete(&directory, "user-42").await?;
//! println!("created {}", org.id);
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod flags;
pub mod models;
pub mod validation;
pub mod wizard;

pub use directory::{LocalDirectory, OrganizationDirectory};
pub use error::{OnboardingError, Result};
pub use flags::OnboardingFlags;
pub use models::{
    AuthProvider, AuthProviderConfig, AuthProviderKind, GitHubRepository, InvitationRole,
    Organization, OrganizationDraft, OrganizationPatch, OrganizationSettings, QueryVisibility,
    SettingsPatch, TOTAL_STEPS, TeamInvitation, WizardData, WizardStep,
};
pub use validation::{ValidationIssue, Validator};
pub use wizard::WizardStore;
