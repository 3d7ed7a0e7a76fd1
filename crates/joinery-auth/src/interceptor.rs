//! Bearer decoration for outgoing API requests.
//!
//! [`AuthorizedClient`] wraps a [`reqwest::Client`]: requests to the Joinery
//! API carry the current access token, and a `401` from the API gets one
//! refresh-and-retry before the session is signed out.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response, StatusCode};

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::service::AuthService;

/// Decides which URLs belong to the Joinery API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiMatcher {
    prefixes: Vec<String>,
}

impl ApiMatcher {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// The configured API base URL plus any extra patterns.
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut prefixes = vec![config.api_base_url.clone()];
        prefixes.extend(
            config
                .api_patterns
                .iter()
                .filter(|p| !p.is_empty() && **p != config.api_base_url)
                .cloned(),
        );
        Self { prefixes }
    }

    pub fn is_api_request(&self, url: &str) -> bool {
        url.contains("/api/") || self.prefixes.iter().any(|p| url.starts_with(p.as_str()))
    }
}

/// HTTP client that authenticates API requests through an [`AuthService`].
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    auth: AuthService,
    matcher: ApiMatcher,
}

impl AuthorizedClient {
    pub fn new(auth: AuthService) -> Self {
        Self::with_http(auth, reqwest::Client::new())
    }

    pub fn with_http(auth: AuthService, http: reqwest::Client) -> Self {
        let matcher = ApiMatcher::from_config(auth.config());
        Self {
            http,
            auth,
            matcher,
        }
    }

    pub fn matcher(&self) -> &ApiMatcher {
        &self.matcher
    }

    /// Start building a request; finish with `.build()` and [`Self::send`].
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Add the bearer header when `request` targets the API and a token is
    /// stored. Returns whether the header was added.
    pub fn decorate(&self, request: &mut Request) -> Result<bool> {
        if !self.matcher.is_api_request(request.url().as_str()) {
            return Ok(false);
        }
        let Some(token) = self.auth.token()? else {
            return Ok(false);
        };
        set_bearer(request, &token)?;
        Ok(true)
    }

    /// Send `request`, decorated.
    ///
    /// An API `401` triggers one token refresh. When the request can be
    /// cloned it is replayed with the new token. A streaming body cannot be
    /// replayed, so after a successful refresh the original `401` response is
    /// returned and the caller decides whether to resend.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthorized`] when the refresh fails or the replay still
    /// answers `401`; the session has been signed out by then. Other
    /// statuses are returned as responses.
    pub async fn send(&self, mut request: Request) -> Result<Response> {
        let url = request.url().to_string();
        let is_api = self.matcher.is_api_request(&url);
        let retry = if is_api { request.try_clone() } else { None };

        self.decorate(&mut request)?;
        let response = self.http.execute(request).await?;
        if !(is_api && response.status() == StatusCode::UNAUTHORIZED) {
            return Ok(log_status(&url, response));
        }

        tracing::warn!(url = %url, "API request unauthorized, attempting token refresh");
        if let Some(token) = self.auth.refresh_token().await {
            let Some(mut retry) = retry else {
                tracing::warn!(url = %url, "request body cannot be replayed, returning the original 401");
                return Ok(response);
            };
            set_bearer(&mut retry, &token)?;
            let response = self.http.execute(retry).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(log_status(&url, response));
            }
        }

        tracing::warn!(url = %url, "unauthorized after refresh, signing out");
        if let Err(e) = self.auth.logout().await {
            tracing::warn!(error = %e, "logout after 401 failed");
        }
        Err(AuthError::Unauthorized)
    }
}

fn set_bearer(request: &mut Request, token: &str) -> Result<()> {
    let value = HeaderValue::from_str(&format!("Bearer {token}"))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

fn log_status(url: &str, response: Response) -> Response {
    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        tracing::warn!(url = %url, "access forbidden");
    } else if status.is_server_error() {
        tracing::error!(url = %url, status = %status, "server error");
    }
    response
}
