//! OAuth exchange client.
//!
//! Joinery uses the authorization code flow with a backend-side token
//! exchange: the client never sees the provider's client secret.
//!
//! # Flow Overview
//!
//! 1. [`OAuthClient::initiate`] generates a random state nonce, persists it,
//!    and builds the provider authorization URL.
//! 2. The provider redirects back with `?code=&state=`.
//! 3. [`OAuthClient::exchange_code`] checks and consumes the nonce, then asks
//!    the backend to trade the code for Joinery tokens.
//! 4. [`OAuthClient::refresh`] and [`OAuthClient::revoke`] talk to the backend
//!    for the rest of the session.


use joinery_vault::{StorageArea, TieredStorage};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::types::{RefreshResponse, TokenResponse, keys};

/// Bytes of entropy in the state nonce (hex-encoded to twice as many chars).
const STATE_NONCE_BYTES: usize = 32;

const CALLBACK_PATH: &str = "auth/github/callback";
const REFRESH_PATH: &str = "auth/refresh";
const LOGOUT_PATH: &str = "auth/logout";

/// Where to send the user to sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    /// The nonce embedded as `state`.
    pub state: String,
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Generate a hex-encoded random state nonce.
///
/// # Errors
///
/// Returns an error if the system CSPRNG fails.
pub fn generate_state_nonce() -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; STATE_NONCE_BYTES];
    rng.fill(&mut bytes).map_err(|_| AuthError::InvalidConfig {
        reason: "failed to generate OAuth state: CSPRNG error".to_string(),
    })?;

    Ok(hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// OAuthClient
// ---------------------------------------------------------------------------

/// Builds provider redirects and talks to the Joinery auth endpoints.
pub struct OAuthClient {
    config: AuthConfig,
    http: reqwest::Client,
    storage: TieredStorage,
}

impl OAuthClient {
    pub fn new(config: AuthConfig, storage: TieredStorage) -> Self {
        Self::with_http(config, storage, reqwest::Client::new())
    }

    pub fn with_http(config: AuthConfig, storage: TieredStorage, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            storage,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.github.is_configured()
    }

    /// Start a login: persist a fresh nonce and build the authorization URL.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotConfigured`] when no real client id is set; callers
    /// fall back to demo mode instead of redirecting.
    pub fn initiate(&self) -> Result<AuthorizationRequest> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let state = generate_state_nonce()?;
        self.storage.durable().set(keys::OAUTH_STATE, &state)?;
        let url = self.authorization_url(&state)?;

        tracing::info!("OAuth login initiated");
        Ok(AuthorizationRequest { url, state })
    }

    /// The provider authorization URL for a given `state`.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.github.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.github.scope)
            .append_pair("state", state)
            .append_pair("response_type", "code");
        Ok(url.to_string())
    }

    /// Verify `state` against the pending nonce and trade `code` for tokens.
    ///
    /// The pending nonce is removed on every call, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidState`] if no nonce is pending or it differs.
    /// - [`AuthError::Network`] on transport failure.
    /// - [`AuthError::ExchangeFailed`] on an empty body or error status.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenResponse> {
        let pending = self.take_pending_state()?;
        match pending {
            Some(expected) if !expected.is_empty() && expected == state => {}
            _ => {
                tracing::warn!("OAuth state mismatch on callback");
                return Err(AuthError::InvalidState);
            }
        }

        tracing::debug!("state verified, exchanging authorization code");

        let body = ExchangeRequest {
            code,
            redirect_uri: &self.config.redirect_uri,
        };
        let response: Option<TokenResponse> = self
            .post_json(CALLBACK_PATH, &body, None, |reason| {
                AuthError::ExchangeFailed { reason }
            })
            .await?;

        response.ok_or_else(|| AuthError::ExchangeFailed {
            reason: "empty response from backend".to_string(),
        })
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        tracing::debug!("refreshing access token");

        let body = RefreshRequest { refresh_token };
        let response: Option<RefreshResponse> = self
            .post_json(REFRESH_PATH, &body, None, |reason| AuthError::RefreshFailed {
                reason,
            })
            .await?;

        response.ok_or_else(|| AuthError::RefreshFailed {
            reason: "empty response from backend".to_string(),
        })
    }

    /// Tell the backend the session is over. Callers treat failure as
    /// non-fatal.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let _: Option<serde_json::Value> = self
            .post_json(
                LOGOUT_PATH,
                &serde_json::json!({}),
                Some(token),
                |reason| AuthError::RevokeFailed { reason },
            )
            .await?;
        tracing::debug!("backend session revoked");
        Ok(())
    }

    // -- Internal helpers ---------------------------------------------------

    fn take_pending_state(&self) -> Result<Option<String>> {
        let pending = self.storage.durable().get(keys::OAUTH_STATE)?;
        self.storage.clear_keys(&[keys::OAUTH_STATE])?;
        Ok(pending)
    }

    /// POST a JSON body and parse a JSON reply; `Ok(None)` for an empty body.
    async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
        on_status: impl FnOnce(String) -> AuthError,
    ) -> Result<Option<R>>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "auth endpoint returned an error");
            return Err(on_status(format!("HTTP {status}: {text}")));
        }

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.github.client_id = "test-client-id".to_string();
        config
    }

    #[test]
    fn nonce_is_64_hex_chars() {
        let nonce = generate_state_nonce().unwrap();
        assert_eq!(nonce.len(), STATE_NONCE_BYTES * 2);
        assert!(nonce.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn nonces_differ() {
        assert_ne!(generate_state_nonce().unwrap(), generate_state_nonce().unwrap());
    }

    #[test]
    fn initiate_requires_client_id() {
        let client = OAuthClient::new(AuthConfig::default(), TieredStorage::in_memory());
        assert!(matches!(client.initiate(), Err(AuthError::NotConfigured)));
    }

    #[test]
    fn initiate_persists_nonce_and_builds_url() {
        let storage = TieredStorage::in_memory();
        let client = OAuthClient::new(configured(), storage.clone());

        let request = client.initiate().unwrap();
        assert_eq!(
            storage.durable().get(keys::OAUTH_STATE).unwrap().as_deref(),
            Some(request.state.as_str())
        );

        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");

        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(params.get("client_id").unwrap(), "test-client-id");
        assert_eq!(
            params.get("redirect_uri").unwrap(),
            "http://localhost:4200/auth/callback"
        );
        assert_eq!(params.get("scope").unwrap(), "user:email read:user");
        assert_eq!(params.get("state").unwrap(), request.state.as_str());
        assert_eq!(params.get("response_type").unwrap(), "code");
    }

    #[tokio::test]
    async fn exchange_without_pending_nonce_is_invalid_state() {
        let client = OAuthClient::new(configured(), TieredStorage::in_memory());
        let result = client.exchange_code("code", "anything").await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn mismatched_state_consumes_nonce() {
        let storage = TieredStorage::in_memory();
        let client = OAuthClient::new(configured(), storage.clone());
        let request = client.initiate().unwrap();

        let result = client.exchange_code("code", "forged").await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
        assert_eq!(storage.locate(keys::OAUTH_STATE).unwrap(), None);

        // The genuine state no longer works either.
        let result = client.exchange_code("code", &request.state).await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn empty_pending_nonce_never_matches() {
        let storage = TieredStorage::in_memory();
        storage.durable().set(keys::OAUTH_STATE, "").unwrap();
        let client = OAuthClient::new(configured(), storage);
        let result = client.exchange_code("code", "").await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
    }

    #[test]
    fn oauth_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OAuthClient>();
    }
}
