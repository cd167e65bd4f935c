//! Fakes shared by the unit tests.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use crate::ports::{KeyValueStore, Navigator, Notice, Notifier, Route};
use crate::storage::MemoryStore;

/// Build an unsigned credential around a JSON payload.
pub fn credential(payload: Value) -> String {
    raw_credential(payload.to_string().as_bytes())
}

/// Build an unsigned credential around arbitrary payload bytes.
pub fn raw_credential(payload: &[u8]) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    format!("{header}.{}.signature", URL_SAFE_NO_PAD.encode(payload))
}

/// Credential for user `u1` / `ana` expiring at `exp`.
pub fn credential_expiring_at(exp: i64) -> String {
    credential(json!({
        "sub": "u1",
        "username": "ana",
        "is_admin": false,
        "exp": exp,
    }))
}

#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn visits(&self) -> Vec<Route> {
        self.visits.lock().unwrap().clone()
    }

    pub fn count(&self, route: &Route) -> usize {
        self.visits().iter().filter(|r| *r == route).count()
    }
}

impl Navigator for RecordingNavigator {
    fn go_to(&self, route: &Route) {
        self.visits.lock().unwrap().push(route.clone());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Store whose writes always fail; reads and clears go to the inner map.
#[derive(Default)]
pub struct ReadOnlyStore {
    pub inner: Arc<MemoryStore>,
}

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set_many(&self, _entries: &[(&str, String)]) -> Result<()> {
        bail!("storage is read-only")
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}
