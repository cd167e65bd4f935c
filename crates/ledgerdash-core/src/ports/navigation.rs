//! Navigation port.
//!
//! Login and logout end in a redirect. The authority asks a [`Navigator`]
//! to perform it instead of driving any particular view stack.

use std::fmt;

/// Path of the public login entry point.
pub const LOGIN_PATH: &str = "/login";

/// Path of the protected area's entry point.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// A view the dashboard shell can be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route(String);

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The login entry point.
    pub fn login() -> Self {
        Self::new(LOGIN_PATH)
    }

    /// The protected area's entry point.
    pub fn dashboard() -> Self {
        Self::new(DASHBOARD_PATH)
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// Public routes render without a session. Only the login view is public.
    pub fn is_public(&self) -> bool {
        self.0 == LOGIN_PATH
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port for page navigation side effects.
pub trait Navigator: Send + Sync {
    /// Send the user to `route`.
    fn go_to(&self, route: &Route);
}
