//! Ledgerdash core - the client-side session and trust-boundary layer.
//!
//! The dashboard talks to a remote bookkeeping API with a bearer
//! credential. This crate owns everything about that credential:
//!
//! - `auth`: decoding, persistence, expiry enforcement, route guarding
//! - `api`: the gateway every request goes through
//! - `ports` / `storage`: the seams to the clock, storage and navigation
//! - `config`: on-disk client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod ports;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiGateway};
pub use auth::{AuthState, RouteGuard, Session, SessionAuthority, UserProfile};
pub use config::Config;
