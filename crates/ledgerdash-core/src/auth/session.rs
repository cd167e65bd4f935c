use std::fmt;

use serde::{Deserialize, Serialize};

use super::token::{self, Claims, DecodeError};

/// The persisted view of who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// A credential together with the claims decoded from it.
///
/// Only constructible from a credential, so the claims always belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    credential: String,
    claims: Claims,
}

impl SessionData {
    /// Decode `credential` and wrap it. Surrounding whitespace is dropped
    /// so the stored credential is exactly the one the claims came from.
    ///
    /// # Errors
    ///
    /// Returns the codec's [`DecodeError`] when the credential is unusable.
    pub fn from_credential(credential: impl Into<String>) -> Result<Self, DecodeError> {
        let credential = credential.into().trim().to_string();
        let claims = token::decode(&credential)?;
        Ok(Self { credential, claims })
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn profile(&self) -> UserProfile {
        self.claims.profile()
    }

    pub fn expires_at(&self) -> i64 {
        self.claims.expires_at
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.claims.is_expired_at(now)
    }

    /// Seconds left before expiry, never negative.
    pub fn seconds_remaining(&self, now: i64) -> i64 {
        (self.claims.expires_at - now).max(0)
    }
}

/// Observable authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Anonymous => f.write_str("anonymous"),
            AuthState::Authenticated => f.write_str("authenticated"),
        }
    }
}

/// The client's current belief about who is logged in and until when.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    data: Option<SessionData>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { data: None }
    }

    pub fn authenticated(data: SessionData) -> Self {
        Self { data: Some(data) }
    }

    pub fn data(&self) -> Option<&SessionData> {
        self.data.as_ref()
    }

    /// Get the bearer credential if signed in
    pub fn credential(&self) -> Option<&str> {
        self.data.as_ref().map(SessionData::credential)
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.data.as_ref().map(SessionData::claims)
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.data.as_ref().map(SessionData::profile)
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.is_some()
    }

    pub fn state(&self) -> AuthState {
        if self.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }
}
