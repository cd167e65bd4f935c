//! HTTP access to the remote bookkeeping API.
//!
//! This module provides the `ApiGateway`, through which every request
//! passes. It attaches the session's bearer credential and applies the
//! session-wide rules for 401 and 403 responses.
//!
//! Credentials are obtained from `POST /auth/login` and decoded locally by
//! the session authority.

pub mod client;
pub mod error;

pub use client::ApiGateway;
pub use error::ApiError;
