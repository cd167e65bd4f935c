//! Session persistence.
//!
//! A session is three keys written and cleared together. Loading is
//! forgiving: anything missing, unreadable or inconsistent is an absent
//! session, never an error.

use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use tracing::{debug, warn};

use super::session::{Session, SessionData, UserProfile};
use crate::ports::KeyValueStore;

/// Key holding the bearer credential.
pub const CREDENTIAL_KEY: &str = "access_token";

/// Key holding the expiry, decimal seconds since the epoch.
pub const EXPIRY_KEY: &str = "expires_at";

/// Key holding the JSON user profile.
pub const PROFILE_KEY: &str = "user";

#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Load the persisted session, or the anonymous one if there is none.
    pub fn load(&self) -> Session {
        match self.try_load() {
            Ok(Some(data)) => {
                debug!(expires_at = data.expires_at(), "Persisted session loaded");
                Session::authenticated(data)
            }
            Ok(None) => {
                debug!("No persisted session");
                Session::anonymous()
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unusable persisted session");
                Session::anonymous()
            }
        }
    }

    fn try_load(&self) -> Result<Option<SessionData>> {
        let credential = self.storage.get(CREDENTIAL_KEY)?;
        let expiry = self.storage.get(EXPIRY_KEY)?;
        let profile = self.storage.get(PROFILE_KEY)?;

        let (credential, expiry, profile) = match (credential, expiry, profile) {
            (Some(c), Some(e), Some(p)) => (c, e, p),
            (None, None, None) => return Ok(None),
            _ => bail!("Persisted session is missing some of its keys"),
        };

        let expires_at = parse_expiry(&expiry)?;
        let profile: UserProfile =
            serde_json::from_str(&profile).context("Stored profile is not valid JSON")?;
        let data =
            SessionData::from_credential(credential).context("Stored credential does not decode")?;

        // All three must come from the same login
        ensure!(
            data.expires_at() == expires_at,
            "Stored expiry does not match the credential"
        );
        ensure!(
            data.profile() == profile,
            "Stored profile does not match the credential"
        );

        Ok(Some(data))
    }

    /// Persist `session`. Saving the anonymous session clears storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium rejects the write.
    pub fn save(&self, session: &Session) -> Result<()> {
        let Some(data) = session.data() else {
            return self.clear();
        };
        let profile = serde_json::to_string(&data.profile())?;
        self.storage.set_many(&[
            (CREDENTIAL_KEY, data.credential().to_string()),
            (EXPIRY_KEY, data.expires_at().to_string()),
            (PROFILE_KEY, profile),
        ])
    }

    /// Remove every persisted key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium rejects the removal.
    pub fn clear(&self) -> Result<()> {
        self.storage.clear()
    }
}

fn parse_expiry(text: &str) -> Result<i64> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Ok(secs);
    }
    let secs: f64 = text
        .parse()
        .with_context(|| format!("Stored expiry {text:?} is not numeric"))?;
    ensure!(secs.is_finite(), "Stored expiry {text:?} is not finite");
    Ok(secs.floor() as i64)
}
