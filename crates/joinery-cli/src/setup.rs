//! Interactive organization setup.
//!
//! Walks a [`WizardStore`] through its five steps from line-based input.
//! Creating the organization is left to the caller so this part stays
//! synchronous and can be driven by scripted input.

use std::io::{BufRead, Write};

use anyhow::Result;
use joinery_onboarding::{
    AuthProvider, AuthProviderKind, GitHubRepository, InvitationRole, OrganizationPatch,
    QueryVisibility, SettingsPatch, TOTAL_STEPS, TeamInvitation, WizardStep, WizardStore,
};

/// Run the wizard. Returns `false` if input ended or the user declined at
/// the review step, in which case the draft has been cancelled.
pub fn run_wizard(wizard: &WizardStore, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<bool> {
    wizard.initialize();

    let finished = organization_step(wizard, input, out)?
        && repository_step(wizard, input, out)?
        && team_step(wizard, input, out)?
        && settings_step(wizard, input, out)?
        && review_step(wizard, input, out)?;

    if !finished {
        wizard.cancel();
        writeln!(out, "  Setup cancelled.")?;
    }
    Ok(finished)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn organization_step(wizard: &WizardStore, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<bool> {
    heading(out, WizardStep::OrganizationDetails)?;

    loop {
        let Some(name) = prompt(input, out, "Organization name")? else {
            return Ok(false);
        };
        let Some(description) = prompt(input, out, "Description (optional)")? else {
            return Ok(false);
        };
        wizard.patch_organization(OrganizationPatch {
            name: Some(name),
            description: Some(description),
            ..OrganizationPatch::default()
        })?;

        let Some(data) = wizard.data() else {
            return Ok(false);
        };
        let issues = wizard.validator().validate_organization(&data.organization);
        if issues.is_empty() {
            break;
        }
        for issue in issues {
            writeln!(out, "  ! {issue}")?;
        }
    }

    writeln!(out, "  Sign-in provider: (1) GitHub  (2) Microsoft  (3) AWS IAM")?;
    let Some(choice) = prompt(input, out, "Enter 1-3 [1]")? else {
        return Ok(false);
    };
    let kind = match choice.as_str() {
        "2" => AuthProviderKind::Microsoft,
        "3" => AuthProviderKind::AwsIam,
        _ => AuthProviderKind::Github,
    };
    wizard.patch_organization(OrganizationPatch {
        auth_provider: Some(Some(AuthProvider::of_kind(kind))),
        ..OrganizationPatch::default()
    })?;

    wizard.next_step()?;
    Ok(true)
}

fn repository_step(wizard: &WizardStore, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<bool> {
    heading(out, WizardStep::RepositoryConnection)?;

    let Some(line) = prompt(input, out, "Repositories as owner/name, comma separated (blank to skip)")? else {
        return Ok(false);
    };
    let repositories = parse_repositories(&line);
    if repositories.is_empty() {
        wizard.skip_step()?;
    } else {
        writeln!(out, "  {} repositories selected.", repositories.len())?;
        wizard.set_repositories(repositories)?;
        wizard.next_step()?;
    }
    Ok(true)
}

fn team_step(wizard: &WizardStore, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<bool> {
    heading(out, WizardStep::TeamMembers)?;
    writeln!(out, "  One invitation per line as `email [admin|member|viewer]`. Blank line to finish.")?;

    let mut invitations = Vec::new();
    loop {
        let Some(line) = prompt(input, out, "Invite")? else {
            return Ok(false);
        };
        if line.is_empty() {
            break;
        }
        let invitation = parse_invitation(&line);
        let mut candidate = invitations.clone();
        candidate.push(invitation);
        let issues = wizard.validator().validate_invitations(&candidate);
        match issues.first() {
            Some(issue) => writeln!(out, "  ! {} {}", line, issue.message)?,
            None => invitations = candidate,
        }
    }

    if invitations.is_empty() {
        wizard.skip_step()?;
    } else {
        wizard.set_team_members(invitations)?;
        wizard.next_step()?;
    }
    Ok(true)
}

fn settings_step(wizard: &WizardStore, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<bool> {
    heading(out, WizardStep::InitialSettings)?;

    writeln!(out, "  Default query visibility: (1) Private  (2) Team  (3) Organization")?;
    let Some(choice) = prompt(input, out, "Enter 1-3 [2]")? else {
        return Ok(false);
    };
    let visibility = match choice.as_str() {
        "1" => QueryVisibility::Private,
        "3" => QueryVisibility::Organization,
        _ => QueryVisibility::Team,
    };
    let Some(approval) = prompt(input, out, "Require approval for new queries? [y/N]")? else {
        return Ok(false);
    };

    wizard.patch_settings(SettingsPatch {
        default_query_visibility: Some(visibility),
        require_approval_for_queries: Some(is_yes(&approval)),
        ..SettingsPatch::default()
    })?;
    wizard.next_step()?;
    Ok(true)
}

fn review_step(wizard: &WizardStore, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<bool> {
    heading(out, WizardStep::Review)?;

    let Some(data) = wizard.data() else {
        return Ok(false);
    };
    let org = &data.organization;
    writeln!(out, "  Name:         {}", org.name.trim())?;
    if !org.description.trim().is_empty() {
        writeln!(out, "  Description:  {}", org.description.trim())?;
    }
    if let Some(provider) = &org.auth_provider {
        writeln!(out, "  Sign-in:      {:?}", provider.kind)?;
    }
    writeln!(out, "  Repositories: {}", data.repositories.len())?;
    writeln!(out, "  Invitations:  {}", data.team_members.len())?;
    writeln!(out, "  Visibility:   {:?}", data.settings.default_query_visibility)?;
    writeln!(out)?;

    let Some(answer) = prompt(input, out, "Create this organization? [Y/n]")? else {
        return Ok(false);
    };
    Ok(answer.is_empty() || is_yes(&answer))
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

fn heading(out: &mut dyn Write, step: WizardStep) -> Result<()> {
    writeln!(out)?;
    let optional = if step.is_optional() { " (optional)" } else { "" };
    writeln!(out, "  Step {}/{TOTAL_STEPS}: {}{optional}", step.number(), step.title())?;
    Ok(())
}

/// Print `label` and read one trimmed line. `None` at end of input.
fn prompt(input: &mut dyn BufRead, out: &mut dyn Write, label: &str) -> Result<Option<String>> {
    write!(out, "  {label}: ")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

fn parse_repositories(line: &str) -> Vec<GitHubRepository> {
    line.split(',')
        .map(str::trim)
        .filter(|full| full.split_once('/').is_some_and(|(o, n)| !o.is_empty() && !n.is_empty()))
        .enumerate()
        .map(|(i, full)| {
            let name = full.rsplit('/').next().unwrap_or(full).to_string();
            GitHubRepository {
                id: i as u64 + 1,
                name,
                full_name: full.to_string(),
                description: None,
                private: false,
                html_url: format!("https://github.com/{full}"),
                clone_url: format!("https://github.com/{full}.git"),
                selected: Some(true),
            }
        })
        .collect()
}

fn parse_invitation(line: &str) -> TeamInvitation {
    let mut parts = line.split_whitespace();
    let email = parts.next().unwrap_or_default();
    let role = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("admin") => InvitationRole::Admin,
        Some("viewer") => InvitationRole::Viewer,
        _ => InvitationRole::Member,
    };
    TeamInvitation::new(email, role)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use joinery_vault::TieredStorage;

    use super::*;

    fn run(script: &str) -> (WizardStore, bool, String) {
        let wizard = WizardStore::new(TieredStorage::in_memory()).unwrap();
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        let done = run_wizard(&wizard, &mut input, &mut out).unwrap();
        (wizard, done, String::from_utf8(out).unwrap())
    }

    #[test]
    fn full_walkthrough_reaches_review() {
        let script = "Acme\nQuery sharing\n2\nacme/queries, acme/etl\n\
                      ada@example.com admin\ngrace@example.com\n\n3\ny\n\n";
        let (wizard, done, _) = run(script);
        assert!(done);
        assert!(wizard.can_complete());

        let data = wizard.data().unwrap();
        assert_eq!(data.current_step, TOTAL_STEPS);
        assert_eq!(data.organization.name, "Acme");
        assert_eq!(
            data.organization.auth_provider.map(|p| p.kind),
            Some(AuthProviderKind::Microsoft)
        );
        assert_eq!(data.repositories.len(), 2);
        assert_eq!(data.repositories[1].full_name, "acme/etl");
        assert_eq!(data.team_members.len(), 2);
        assert_eq!(data.team_members[0].role, InvitationRole::Admin);
        assert_eq!(data.team_members[1].role, InvitationRole::Member);
        assert_eq!(data.settings.default_query_visibility, QueryVisibility::Organization);
        assert!(data.settings.require_approval_for_queries);
    }

    #[test]
    fn invalid_name_is_asked_again() {
        let script = "A!\n\nAcme\n\n\n\n\n\n\n\n";
        let (wizard, done, output) = run(script);
        assert!(done);
        assert!(output.contains("! name"));
        assert_eq!(wizard.data().unwrap().organization.name, "Acme");
    }

    #[test]
    fn bad_invitations_are_rejected_individually() {
        let script = "Acme\n\n\n\nnope\nada@example.com\nADA@example.com\n\n\n\n\n";
        let (wizard, done, output) = run(script);
        assert!(done);
        assert!(output.contains("nope is not a valid email"));
        assert!(output.contains("is a duplicate"));
        assert_eq!(wizard.data().unwrap().team_members.len(), 1);
    }

    #[test]
    fn declining_review_cancels() {
        let script = "Acme\n\n\n\n\n\n\nn\n";
        let (wizard, done, output) = run(script);
        assert!(!done);
        assert!(wizard.data().is_none());
        assert!(output.contains("Setup cancelled."));
    }

    #[test]
    fn end_of_input_cancels() {
        let (wizard, done, _) = run("Acme\n");
        assert!(!done);
        assert!(wizard.data().is_none());
    }

    #[test]
    fn repository_parsing_skips_malformed_entries() {
        let repos = parse_repositories("acme/queries, nope, /x, acme/");
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "queries");
        assert_eq!(repos[0].html_url, "https://github.com/acme/queries");
    }
}
