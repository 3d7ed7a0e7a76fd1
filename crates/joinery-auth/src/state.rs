//! Observable authentication state.
//!
//! [`AuthState`] is the in-memory mirror of the stored session. It is backed
//! by a [`tokio::sync::watch`] channel: readers get the latest snapshot
//! synchronously, subscribers are woken on every change.

use tokio::sync::watch;

use crate::types::{AuthMode, User};

/// The authentication state at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthSnapshot {
    pub authenticated: bool,
    pub user: Option<User>,
    /// `None` while signed out.
    pub mode: Option<AuthMode>,
}

impl AuthSnapshot {
    pub fn signed_in(user: User, mode: AuthMode) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
            mode: Some(mode),
        }
    }
}

/// Holder of the current [`AuthSnapshot`].
#[derive(Debug)]
pub struct AuthState {
    tx: watch::Sender<AuthSnapshot>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    /// Start signed out.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::default());
        Self { tx }
    }

    /// Receive every future change; the current value is readable at once.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().authenticated
    }

    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().user.clone()
    }

    pub fn mode(&self) -> Option<AuthMode> {
        self.tx.borrow().mode
    }

    pub fn set_authenticated(&self, user: User, mode: AuthMode) {
        tracing::debug!(user_id = %user.id, ?mode, "auth state: signed in");
        self.tx.send_replace(AuthSnapshot::signed_in(user, mode));
    }

    pub fn clear(&self) {
        tracing::debug!("auth state: signed out");
        self.tx.send_replace(AuthSnapshot::default());
    }
}
