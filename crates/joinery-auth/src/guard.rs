//! Route guard: only authenticated users get past protected routes.

use std::time::Duration;

use crate::service::AuthService;
use crate::state::AuthSnapshot;

pub const LOGIN_ROUTE: &str = "/auth/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

impl GuardDecision {
    pub fn for_snapshot(snapshot: &AuthSnapshot) -> Self {
        if snapshot.authenticated {
            Self::Allow
        } else {
            Self::Redirect(LOGIN_ROUTE.to_string())
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct AuthGuard {
    auth: AuthService,
}

impl AuthGuard {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }

    pub fn check(&self) -> GuardDecision {
        GuardDecision::for_snapshot(&self.auth.snapshot())
    }

    /// Wait up to `timeout` for a sign-in, e.g. while a callback completes
    /// elsewhere. Returns the decision at that point.
    pub async fn wait_for(&self, timeout: Duration) -> GuardDecision {
        let mut rx = self.auth.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|s| s.authenticated)).await {
            Ok(Ok(snapshot)) => GuardDecision::for_snapshot(&snapshot),
            _ => self.check(),
        }
    }
}
