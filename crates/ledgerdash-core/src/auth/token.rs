//! Credential decoding.
//!
//! Credentials are compact JWS tokens (`header.payload.signature`). Only the
//! payload is read. The signature is not checked here: the server verifies
//! every request it receives, and the decoded claims are only used for
//! display, admin-gated UI and the local expiry pre-check.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::session::UserProfile;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Credential must have 3 dot-separated segments, found {0}")]
    Malformed(usize),

    #[error("Credential payload is not base64url")]
    Encoding,

    #[error("Credential payload is not a valid claims object: {0}")]
    Payload(String),

    #[error("Credential has no expiry claim")]
    MissingExpiry,

    #[error("Credential expiry claim is not numeric")]
    InvalidExpiry,
}

/// Fields recovered from a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub is_admin: bool,
    /// Expiry as seconds since the Unix epoch.
    pub expires_at: i64,
}

impl Claims {
    /// A credential is expired from its expiry second onwards.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.subject_id.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            is_admin: self.is_admin,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: SubjectId,
    username: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    is_admin: Option<bool>,
    #[serde(default)]
    exp: Option<Value>,
}

/// Issuers put either a string or a database id in `sub`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubjectId {
    Text(String),
    Number(i64),
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        match id {
            SubjectId::Text(s) => s,
            SubjectId::Number(n) => n.to_string(),
        }
    }
}

/// Decode a credential into its claims.
///
/// # Errors
///
/// Returns [`DecodeError`] when the credential is not a three-segment token,
/// the payload is not base64url JSON with `sub` and `username`, or `exp` is
/// missing or not a number.
pub fn decode(credential: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = credential.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Malformed(segments.len()));
    }

    // Padded payloads show up from some issuers; the engine wants none.
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| DecodeError::Encoding)?;

    let raw: RawClaims =
        serde_json::from_slice(&payload).map_err(|e| DecodeError::Payload(e.to_string()))?;

    let expires_at = match raw.exp {
        None => return Err(DecodeError::MissingExpiry),
        Some(exp) => expiry_seconds(&exp)?,
    };

    Ok(Claims {
        subject_id: raw.sub.into(),
        username: raw.username,
        first_name: raw.first_name.filter(|name| !name.is_empty()),
        is_admin: raw.is_admin.unwrap_or(false),
        expires_at,
    })
}

fn expiry_seconds(exp: &Value) -> Result<i64, DecodeError> {
    let Value::Number(n) = exp else {
        return Err(DecodeError::InvalidExpiry);
    };
    if let Some(secs) = n.as_i64() {
        return Ok(secs);
    }
    // Fractional or out-of-range expiries: whole seconds, saturating.
    n.as_f64()
        .map(|secs| secs.floor() as i64)
        .ok_or(DecodeError::InvalidExpiry)
}
