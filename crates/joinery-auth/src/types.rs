//! Core data types shared across the auth engine.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Storage keys. Both areas use the same key set.
pub mod keys {
    pub const JWT_TOKEN: &str = "jwt_token";
    pub const JWT_TOKEN_EXPIRY: &str = "jwt_token_expiry";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const CURRENT_USER: &str = "current_user";
    pub const AUTH_PERSISTENT: &str = "auth_persistent";
    pub const DEMO_AUTH: &str = "demo_auth";
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Fields that make up a stored session record.
    pub const RECORD: [&str; 5] = [
        JWT_TOKEN,
        JWT_TOKEN_EXPIRY,
        REFRESH_TOKEN,
        CURRENT_USER,
        AUTH_PERSISTENT,
    ];

    /// Every key the auth engine ever writes.
    pub const ALL: [&str; 7] = [
        JWT_TOKEN,
        JWT_TOKEN_EXPIRY,
        REFRESH_TOKEN,
        CURRENT_USER,
        AUTH_PERSISTENT,
        DEMO_AUTH,
        OAUTH_STATE,
    ];
}

/// An authenticated Joinery user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything persisted for one authenticated session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Bearer credential for API calls.
    pub access_token: String,
    /// Used to mint new access tokens.
    pub refresh_token: Option<String>,
    /// Absolute expiration of `access_token`.
    pub expiry: DateTime<Utc>,
    /// The signed-in user. A record without a user is never stored.
    pub user: Option<User>,
    /// Durable (`true`) or ephemeral (`false`) storage.
    pub persistent: bool,
}

impl SessionRecord {
    /// Build a record from a token response received now.
    ///
    /// A lifetime that is not positive or overflows the clock is an
    /// [`AuthError::ExchangeFailed`].
    pub fn from_token_response(response: TokenResponse, persistent: bool) -> Result<Self> {
        let expiry = expiry_from_now(response.expires_in).ok_or_else(|| {
            AuthError::ExchangeFailed {
                reason: format!("invalid token lifetime: {}s", response.expires_in),
            }
        })?;
        Ok(Self {
            expiry,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user: Some(response.user),
            persistent,
        })
    }
}

/// Result of validating whatever session is currently stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionValidation {
    pub is_valid: bool,
    pub user: Option<User>,
    /// The token expires within the refresh lead window.
    pub needs_refresh: bool,
    pub expiry: Option<DateTime<Utc>>,
}

impl SessionValidation {
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Real identity provider login with backend-issued tokens.
    #[serde(rename = "oauth")]
    OAuth,
    /// Fixed mock user, no tokens.
    Demo,
}

/// Backend response to an authorization code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: i64,
    pub user: User,
}

/// Backend response to a refresh request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Absolute expiry for a lifetime of `expires_in` seconds starting now.
///
/// `None` unless the lifetime is positive and the result is representable.
pub fn expiry_from_now(expires_in: i64) -> Option<DateTime<Utc>> {
    if expires_in <= 0 {
        return None;
    }
    TimeDelta::try_seconds(expires_in).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}
