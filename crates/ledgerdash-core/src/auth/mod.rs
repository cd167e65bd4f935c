//! Authentication module: the client side of the trust boundary.
//!
//! This module provides:
//! - `token`: decodes credentials into claims (no signature check)
//! - `SessionStore`: persists credential, expiry and profile as one unit
//! - `ExpiryMonitor`: ends the session when the credential expires
//! - `SessionAuthority`: the single owner of the session state
//! - `RouteGuard`: keeps protected views away from anonymous users

pub mod authority;
pub mod guard;
pub mod monitor;
pub mod session;
pub mod store;
pub mod token;

pub use authority::{LogoutReason, SessionAuthority};
pub use guard::{GuardDecision, RouteGuard};
pub use monitor::ExpiryMonitor;
pub use session::{AuthState, Session, SessionData, UserProfile};
pub use store::SessionStore;
pub use token::{decode, Claims, DecodeError};
