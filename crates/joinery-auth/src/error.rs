//! Error types for the auth crate.
//!
//! All auth operations surface errors through [`AuthError`]. The variants
//! split into recoverable conditions that the facade turns into a demo login
//! ([`AuthError::NotConfigured`], network-class [`AuthError::Network`]) and
//! conditions that are shown to the user ([`AuthError::InvalidState`],
//! [`AuthError::ExchangeFailed`], ...).

/// Unified error type for the Joinery auth engine.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable OAuth client id is configured.
    #[error("GitHub OAuth not configured")]
    NotConfigured,

    /// The `state` returned by the identity provider does not match the
    /// nonce generated for this login attempt (or no nonce was pending).
    #[error("invalid OAuth state parameter")]
    InvalidState,

    /// The backend did not return tokens for an authorization code.
    #[error("failed to exchange authorization code: {reason}")]
    ExchangeFailed {
        /// What the backend returned instead.
        reason: String,
    },

    /// The backend did not return a fresh access token.
    #[error("failed to refresh token: {reason}")]
    RefreshFailed {
        /// What the backend returned instead.
        reason: String,
    },

    /// The backend rejected the logout notification.
    #[error("backend logout failed: {reason}")]
    RevokeFailed {
        /// What the backend returned instead.
        reason: String,
    },

    /// An HTTP request could not be completed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Stored session data could not be parsed.
    #[error("stored session is corrupt: {reason}")]
    StorageCorruption {
        /// Which field failed and why.
        reason: String,
    },

    /// An API request was rejected and the session could not be refreshed.
    #[error("request unauthorized, session ended")]
    Unauthorized,

    /// The identity provider redirected back with an `error` parameter.
    #[error("OAuth error: {error}")]
    ProviderDenied {
        /// The provider's error code, e.g. `access_denied`.
        error: String,
    },

    /// The identity provider redirect carried no authorization code.
    #[error("no authorization code received")]
    MissingCode,

    /// The local callback listener gave up waiting for the redirect.
    #[error("callback timed out after {timeout_secs} seconds")]
    CallbackTimeout {
        /// How long we waited.
        timeout_secs: u64,
    },

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A bearer token could not be placed in a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// An error from the storage areas.
    #[error("storage error: {0}")]
    Vault(#[from] joinery_vault::VaultError),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (callback listener, config file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// Whether this is a transport-level failure, i.e. the backend was never
    /// reached or never answered.
    ///
    /// HTTP status and body decoding errors do not count.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_status() && !e.is_decode(),
            _ => false,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
