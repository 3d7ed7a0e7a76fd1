//! Authentication engine for Joinery.
//!
//! This crate owns everything between "the user clicked sign in" and "the
//! user is signed out":
//!
//! - **OAuth authorization code flow** with a backend-side token exchange
//!   and a CSRF state nonce
//! - **Credential store** over the durable and ephemeral storage areas
//! - **Session monitor**: idle warning, idle logout and token refresh timers
//! - **Demo mode** with a fixed mock user when OAuth is unavailable
//! - **Bearer decoration** of outgoing API requests with one refresh retry
//!
//! # Architecture
//!
//! ```text
//! AuthService
//! ├── OAuthClient       (authorize URL, code exchange, refresh, revoke)
//! ├── CredentialStore   (session record in TieredStorage)
//! ├── SessionMonitor    (idle + refresh timers) ──► Notifier
//! ├── DemoAuth          (mock user fallback)
//! └── AuthState         (watch channel of AuthSnapshot)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use joinery_auth::{AuthService, LoginOutcome, Settings};
//! use joinery_vault::TieredStorage;
//!
//! # async fn example() -> joinery_auth::Result<()> {
//! let storage = TieredStorage::open("data/joinery.db")?;
//! let auth = AuthService::bootstrap(Settings::default(), storage).await?;
//!
//! match auth.login_with_provider(true).await? {
//!     LoginOutcome::Redirect(url) => println!("open {url}"),
//!     LoginOutcome::Demo(user) => println!("demo user {}", user.name),
//! }
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod demo;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod monitor;
pub mod notify;
pub mod oauth;
pub mod service;
pub mod state;
pub mod token_store;
pub mod types;

pub use callback::{CallbackParams, CallbackServer};
pub use config::{AuthConfig, GithubConfig, SessionTimings, Settings};
pub use demo::DemoAuth;
pub use error::{AuthError, Result};
pub use guard::{AuthGuard, GuardDecision};
pub use interceptor::{ApiMatcher, AuthorizedClient};
pub use monitor::{ActivityEvent, EndReason, MonitorPhase, SessionHooks, SessionMonitor};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use oauth::{AuthorizationRequest, OAuthClient};
pub use service::{AuthService, LoginOutcome};
pub use state::{AuthSnapshot, AuthState};
pub use token_store::CredentialStore;
pub use types::{AuthMode, RefreshResponse, SessionRecord, SessionValidation, TokenResponse, User};
