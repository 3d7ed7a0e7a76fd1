//! Wizard and organization data.
//!
//! Field names serialize in camelCase (`currentStep`, `defaultQueryVisibility`),
//! except [`GitHubRepository`], which mirrors the GitHub API's snake_case.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of wizard steps, the last being the review step.
pub const TOTAL_STEPS: u8 = 5;

// ---------------------------------------------------------------------------
// Organization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthProviderKind {
    Microsoft,
    #[default]
    Github,
    AwsIam,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviderConfig {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Identity provider the organization's members sign in with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProvider {
    #[serde(rename = "type")]
    pub kind: AuthProviderKind,
    #[serde(default)]
    pub config: AuthProviderConfig,
}

impl AuthProvider {
    pub fn of_kind(kind: AuthProviderKind) -> Self {
        Self {
            kind,
            config: AuthProviderConfig::default(),
        }
    }
}

/// Organization details collected by step 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDraft {
    pub name: String,
    pub description: String,
    pub auth_provider: Option<AuthProvider>,
}

impl Default for OrganizationDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            auth_provider: Some(AuthProvider::of_kind(AuthProviderKind::Github)),
        }
    }
}

/// Partial update of an [`OrganizationDraft`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub auth_provider: Option<Option<AuthProvider>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Repositories and team
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
    pub clone_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationRole {
    Admin,
    #[default]
    Member,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInvitation {
    pub email: String,
    #[serde(default)]
    pub role: InvitationRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TeamInvitation {
    pub fn new(email: impl Into<String>, role: InvitationRole) -> Self {
        Self {
            email: email.into(),
            role,
            name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryVisibility {
    Private,
    #[default]
    Team,
    Organization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSettings {
    pub default_query_visibility: QueryVisibility,
    pub allow_repository_integration: bool,
    pub require_approval_for_queries: bool,
    pub enable_audit_logging: bool,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            default_query_visibility: QueryVisibility::Team,
            allow_repository_integration: true,
            require_approval_for_queries: false,
            enable_audit_logging: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub default_query_visibility: Option<QueryVisibility>,
    pub allow_repository_integration: Option<bool>,
    pub require_approval_for_queries: Option<bool>,
    pub enable_audit_logging: Option<bool>,
}

// ---------------------------------------------------------------------------
// Wizard
// ---------------------------------------------------------------------------

/// The five wizard steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    OrganizationDetails = 1,
    RepositoryConnection = 2,
    TeamMembers = 3,
    InitialSettings = 4,
    Review = 5,
}

impl WizardStep {
    pub const ALL: [WizardStep; TOTAL_STEPS as usize] = [
        Self::OrganizationDetails,
        Self::RepositoryConnection,
        Self::TeamMembers,
        Self::InitialSettings,
        Self::Review,
    ];

    pub fn from_number(step: u8) -> Option<Self> {
        Self::ALL.get(usize::from(step).checked_sub(1)?).copied()
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::OrganizationDetails => "Organization Details",
            Self::RepositoryConnection => "Repository Connection",
            Self::TeamMembers => "Team Members",
            Self::InitialSettings => "Initial Settings",
            Self::Review => "Review & Confirm",
        }
    }

    /// Repositories and team members can be skipped.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::RepositoryConnection | Self::TeamMembers)
    }
}

/// Everything the setup wizard has collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardData {
    pub organization: OrganizationDraft,
    pub repositories: Vec<GitHubRepository>,
    pub team_members: Vec<TeamInvitation>,
    pub settings: OrganizationSettings,
    pub current_step: u8,
    pub completed: bool,
    /// Steps the user has moved past.
    #[serde(default)]
    pub completed_steps: BTreeSet<u8>,
}

impl Default for WizardData {
    fn default() -> Self {
        Self {
            organization: OrganizationDraft::default(),
            repositories: Vec::new(),
            team_members: Vec::new(),
            settings: OrganizationSettings::default(),
            current_step: 1,
            completed: false,
            completed_steps: BTreeSet::new(),
        }
    }
}

impl WizardData {
    pub fn current(&self) -> Option<WizardStep> {
        WizardStep::from_number(self.current_step)
    }

    /// Whether `step` has what it needs to move on.
    pub fn is_step_valid(&self, step: WizardStep) -> bool {
        match step {
            WizardStep::OrganizationDetails => {
                !self.organization.name.trim().is_empty()
                    && self.organization.auth_provider.is_some()
            }
            WizardStep::RepositoryConnection | WizardStep::TeamMembers => true,
            // The visibility always has a value.
            WizardStep::InitialSettings => true,
            WizardStep::Review => {
                self.is_step_valid(WizardStep::OrganizationDetails)
                    && self.is_step_valid(WizardStep::InitialSettings)
            }
        }
    }

    /// Whether every required step before `step` has been completed.
    pub fn can_access(&self, step: WizardStep) -> bool {
        WizardStep::ALL
            .iter()
            .take_while(|s| **s < step)
            .all(|s| s.is_optional() || self.completed_steps.contains(&s.number()))
    }

    pub fn can_complete(&self) -> bool {
        !self.completed
            && self.is_step_valid(WizardStep::OrganizationDetails)
            && self.is_step_valid(WizardStep::InitialSettings)
            && self.current_step == TOTAL_STEPS
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
