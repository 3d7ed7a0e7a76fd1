//! Error types for the onboarding crate.

use crate::validation::ValidationIssue;

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    /// No wizard draft exists, or it was already completed.
    #[error("no wizard data available")]
    NoDraft,

    /// The requested step does not exist or cannot be entered yet.
    #[error("wizard step {step} is not available")]
    InvalidStep { step: u8 },

    /// The draft fails field validation.
    #[error("invalid wizard data: {}", join_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    /// Another organization already uses this name.
    #[error("organization name already taken: {name}")]
    NameTaken { name: String },

    /// A built-in validation pattern failed to compile.
    #[error("invalid validation pattern: {reason}")]
    InvalidPattern { reason: String },

    #[error("storage error: {0}")]
    Vault(#[from] joinery_vault::VaultError),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, OnboardingError>;
