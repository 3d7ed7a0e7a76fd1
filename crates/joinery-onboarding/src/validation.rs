//! Field validation for wizard input.
//!
//! Step gates in [`crate::models::WizardData`] only decide whether the user
//! may move on. The checks here are stricter and run again when the wizard is
//! completed, so a draft patched around the step gates cannot slip through.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OnboardingError, Result};
use crate::models::{OrganizationDraft, TeamInvitation};

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

const NAME_PATTERN: &str = r"^[a-zA-Z0-9\s\-_.]+$";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

/// One failed field check. `field` uses the web client's camelCase path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Compiled validation patterns.
#[derive(Debug, Clone)]
pub struct Validator {
    name_pattern: Regex,
    email_pattern: Regex,
}

impl Validator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            name_pattern: compile(NAME_PATTERN)?,
            email_pattern: compile(EMAIL_PATTERN)?,
        })
    }

    pub fn is_valid_email(&self, email: &str) -> bool {
        self.email_pattern.is_match(email)
    }

    /// Check the organization name and description.
    pub fn validate_organization(&self, draft: &OrganizationDraft) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let name = draft.name.trim();
        let len = name.chars().count();

        if name.is_empty() {
            issues.push(ValidationIssue::new("name", "is required"));
        } else if len < NAME_MIN_CHARS {
            issues.push(ValidationIssue::new(
                "name",
                format!("must be at least {NAME_MIN_CHARS} characters"),
            ));
        } else if len > NAME_MAX_CHARS {
            issues.push(ValidationIssue::new(
                "name",
                format!("must be at most {NAME_MAX_CHARS} characters"),
            ));
        } else if !self.name_pattern.is_match(name) {
            issues.push(ValidationIssue::new(
                "name",
                "may only contain letters, numbers, spaces, hyphens, underscores and periods",
            ));
        }

        if draft.description.chars().count() > DESCRIPTION_MAX_CHARS {
            issues.push(ValidationIssue::new(
                "description",
                format!("must be at most {DESCRIPTION_MAX_CHARS} characters"),
            ));
        }

        if draft.auth_provider.is_none() {
            issues.push(ValidationIssue::new("authProvider", "is required"));
        }

        issues
    }

    /// Check invitation emails. Rows with a blank email are ignored.
    pub fn validate_invitations(&self, invitations: &[TeamInvitation]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (i, invitation) in invitations.iter().enumerate() {
            let email = invitation.email.trim();
            if email.is_empty() {
                continue;
            }
            let field = format!("teamMembers[{i}].email");
            if !self.is_valid_email(email) {
                issues.push(ValidationIssue::new(field, "is not a valid email"));
            } else if !seen.insert(email.to_lowercase()) {
                issues.push(ValidationIssue::new(field, "is a duplicate"));
            }
        }

        issues
    }

    /// Trim emails and drop rows left blank.
    pub fn normalize_invitations(invitations: Vec<TeamInvitation>) -> Vec<TeamInvitation> {
        invitations
            .into_iter()
            .filter_map(|mut inv| {
                let email = inv.email.trim();
                if email.is_empty() {
                    return None;
                }
                inv.email = email.to_string();
                Some(inv)
            })
            .collect()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| OnboardingError::InvalidPattern {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvitationRole;

    fn draft(name: &str) -> OrganizationDraft {
        OrganizationDraft {
            name: name.to_string(),
            ..OrganizationDraft::default()
        }
    }

    fn fields(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.field.as_str()).collect()
    }

    #[test]
    fn accepts_reasonable_names() {
        let v = Validator::new().unwrap();
        for name in ["Acme", "acme-labs", "Team_42", "Data Eng. West"] {
            assert!(v.validate_organization(&draft(name)).is_empty(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        let v = Validator::new().unwrap();
        for name in ["", "  ", "A", "Acme!", "semi;colon"] {
            assert_eq!(fields(&v.validate_organization(&draft(name))), vec!["name"], "{name:?}");
        }
        let long = "x".repeat(NAME_MAX_CHARS + 1);
        assert_eq!(fields(&v.validate_organization(&draft(&long))), vec!["name"]);
        let max = "x".repeat(NAME_MAX_CHARS);
        assert!(v.validate_organization(&draft(&max)).is_empty());
    }

    #[test]
    fn description_limit() {
        let v = Validator::new().unwrap();
        let mut d = draft("Acme");
        d.description = "d".repeat(DESCRIPTION_MAX_CHARS);
        assert!(v.validate_organization(&d).is_empty());
        d.description.push('d');
        assert_eq!(fields(&v.validate_organization(&d)), vec!["description"]);
    }

    #[test]
    fn missing_provider_is_reported() {
        let v = Validator::new().unwrap();
        let mut d = draft("Acme");
        d.auth_provider = None;
        assert_eq!(fields(&v.validate_organization(&d)), vec!["authProvider"]);
    }

    #[test]
    fn emails() {
        let v = Validator::new().unwrap();
        assert!(v.is_valid_email("ada@example.com"));
        assert!(v.is_valid_email("first.last+tag@sub.example.org"));
        assert!(!v.is_valid_email("not-an-email"));
        assert!(!v.is_valid_email("two@@example.com"));
        assert!(!v.is_valid_email("space in@example.com"));
    }

    #[test]
    fn invitation_duplicates_are_case_insensitive() {
        let v = Validator::new().unwrap();
        let invitations = vec![
            TeamInvitation::new("ada@example.com", InvitationRole::Admin),
            TeamInvitation::new("", InvitationRole::Member),
            TeamInvitation::new("ADA@example.com", InvitationRole::Viewer),
            TeamInvitation::new("bogus", InvitationRole::Member),
        ];
        let issues = v.validate_invitations(&invitations);
        assert_eq!(
            fields(&issues),
            vec!["teamMembers[2].email", "teamMembers[3].email"]
        );
        assert_eq!(issues[0].message, "is a duplicate");
    }

    #[test]
    fn normalize_drops_blank_rows() {
        let rows = vec![
            TeamInvitation::new("  ada@example.com ", InvitationRole::Admin),
            TeamInvitation::new("   ", InvitationRole::Member),
        ];
        let kept = Validator::normalize_invitations(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].email, "ada@example.com");
        assert_eq!(kept[0].role, InvitationRole::Admin);
    }
}
