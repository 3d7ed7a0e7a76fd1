//! Auth and session configuration.
//!
//! Settings come from the `[auth]` and `[session]` tables of
//! `config/default.toml`, then `JOINERY_*` environment variables override
//! individual fields. Missing files and tables fall back to defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Client ids starting with this prefix are template placeholders.
const PLACEHOLDER_CLIENT_ID_PREFIX: &str = "your-github-client-id";

/// Identity provider authorization endpoint.
pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auth: AuthConfig,
    pub session: SessionTimings,
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AuthError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    /// Apply `JOINERY_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("JOINERY_API_BASE_URL") {
            self.auth.api_base_url = v;
        }
        if let Some(v) = lookup("JOINERY_REDIRECT_URI") {
            self.auth.redirect_uri = v;
        }
        if let Some(v) = lookup("JOINERY_GITHUB_CLIENT_ID") {
            self.auth.github.client_id = v;
        }
        if let Some(v) = lookup("JOINERY_GITHUB_SCOPE") {
            self.auth.github.scope = v;
        }
        if let Some(v) = lookup("JOINERY_PRODUCTION") {
            self.auth.production = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Identity provider client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub client_id: String,
    pub scope: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            client_id: PLACEHOLDER_CLIENT_ID_PREFIX.to_string(),
            scope: "user:email read:user".to_string(),
        }
    }
}

impl GithubConfig {
    /// Whether a real client id is present.
    pub fn is_configured(&self) -> bool {
        let id = self.client_id.trim();
        !id.is_empty() && !id.starts_with(PLACEHOLDER_CLIENT_ID_PREFIX)
    }
}

/// Backend and OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the Joinery API, without a trailing slash.
    pub api_base_url: String,
    /// Where the identity provider sends the browser back to.
    pub redirect_uri: String,
    /// Production deployments never fall back to demo mode on network errors.
    pub production: bool,
    /// Extra URL prefixes that receive the bearer header.
    pub api_patterns: Vec<String>,
    /// Identity provider authorization endpoint.
    pub authorize_url: String,
    /// How long the CLI callback listener waits for the redirect.
    pub callback_timeout_secs: u64,
    pub github: GithubConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            redirect_uri: "http://localhost:4200/auth/callback".to_string(),
            production: false,
            api_patterns: Vec::new(),
            authorize_url: GITHUB_AUTHORIZE_URL.to_string(),
            callback_timeout_secs: 300,
            github: GithubConfig::default(),
        }
    }
}

impl AuthConfig {
    /// `{api_base_url}{path}` with exactly one slash between them.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Demo mode is available outside production, or whenever OAuth is not
    /// configured at all.
    pub fn is_demo_enabled(&self) -> bool {
        !self.production || !self.github.is_configured()
    }
}

// ---------------------------------------------------------------------------
// SessionTimings
// ---------------------------------------------------------------------------

/// Durations driving the session monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// Inactivity before the session is logged out.
    pub idle_timeout_secs: u64,
    /// How long before the idle logout the warning is shown.
    pub warning_lead_secs: u64,
    /// How long before token expiry the refresh fires.
    pub refresh_lead_secs: u64,
    /// Minimum spacing between activity-driven timer resets.
    pub activity_throttle_ms: u64,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            warning_lead_secs: 5 * 60,
            refresh_lead_secs: 5 * 60,
            activity_throttle_ms: 1000,
        }
    }
}

impl SessionTimings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Delay from arming to the warning notice.
    pub fn warning_after(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.saturating_sub(self.warning_lead_secs))
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn activity_throttle(&self) -> Duration {
        Duration::from_millis(self.activity_throttle_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
