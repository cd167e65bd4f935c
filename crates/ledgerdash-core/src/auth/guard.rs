//! Gate in front of protected views.

use std::sync::Arc;

use tracing::debug;

use super::authority::SessionAuthority;
use super::session::AuthState;
use crate::ports::{Navigator, Route};

/// Outcome of checking a route against the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect(Route),
}

/// Reads the session authority to decide whether a view may render.
///
/// Holds no session state of its own and never changes the session.
#[derive(Clone)]
pub struct RouteGuard {
    authority: SessionAuthority,
    navigator: Arc<dyn Navigator>,
}

impl RouteGuard {
    pub fn new(authority: SessionAuthority, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            authority,
            navigator,
        }
    }

    /// Decide whether `route` may render right now.
    pub fn check(&self, route: &Route) -> GuardDecision {
        if route.is_public() {
            return GuardDecision::Render;
        }
        match self.authority.state() {
            AuthState::Authenticated => GuardDecision::Render,
            AuthState::Anonymous => GuardDecision::Redirect(Route::login()),
        }
    }

    /// Like [`check`](Self::check) for a raw path. The root path always
    /// forwards to the dashboard.
    pub fn resolve(&self, path: &str) -> GuardDecision {
        let path = path.trim();
        if path.is_empty() || path == "/" {
            return GuardDecision::Redirect(Route::dashboard());
        }
        self.check(&Route::new(path))
    }

    /// Run `view` if `route` may render; otherwise redirect and return `None`.
    pub fn render<T>(&self, route: &Route, view: impl FnOnce() -> T) -> Option<T> {
        match self.check(route) {
            GuardDecision::Render => Some(view()),
            GuardDecision::Redirect(target) => {
                debug!(%route, %target, "Blocked protected view");
                self.navigator.go_to(&target);
                None
            }
        }
    }
}
