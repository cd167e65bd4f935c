//! The session authority: sole owner and writer of the session.
//!
//! Three independent triggers can end a session: the user logging out, the
//! expiry monitor, and the API gateway seeing a 401. All of them funnel into
//! one transition that runs under the state lock, so they can race freely
//! without double redirects or double cancellation.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::monitor::{ExpiryMonitor, DEFAULT_CHECK_INTERVAL};
use super::session::{AuthState, Session, SessionData, UserProfile};
use super::store::SessionStore;
use crate::ports::{Clock, KeyValueStore, Navigator, Route, SystemClock};

/// Why a session ended. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    Expired,
    Unauthorized,
    InvalidCredential,
    StorageFailure,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            LogoutReason::UserRequested => "user requested",
            LogoutReason::Expired => "expired",
            LogoutReason::Unauthorized => "rejected by server",
            LogoutReason::InvalidCredential => "invalid credential",
            LogoutReason::StorageFailure => "storage failure",
        };
        f.write_str(reason)
    }
}

/// Shared handle to the session. Clone is cheap; all clones see one session.
#[derive(Clone)]
pub struct SessionAuthority {
    inner: Arc<Inner>,
}

struct Inner {
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    check_interval: Duration,
    state: Mutex<State>,
    changes: watch::Sender<AuthState>,
}

struct State {
    session: Session,
    monitor: Option<ExpiryMonitor>,
    /// Bumped on every login so a stale monitor cannot end a newer session.
    generation: u64,
    /// The last redirect issued went to the login entry point.
    at_login_entry: bool,
}

impl SessionAuthority {
    /// Create an authority on the system clock with a one-second expiry check.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime.
    pub fn new(storage: Arc<dyn KeyValueStore>, navigator: Arc<dyn Navigator>) -> Result<Self> {
        Self::with_clock(
            storage,
            navigator,
            Arc::new(SystemClock),
            DEFAULT_CHECK_INTERVAL,
        )
    }

    /// Create an authority and restore any persisted session.
    ///
    /// A persisted session that has already expired is ended before this
    /// returns, so no caller ever observes it as authenticated.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime.
    pub fn with_clock(
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        check_interval: Duration,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .context("SessionAuthority must be created inside a tokio runtime")?;
        let store = SessionStore::new(storage);
        let persisted = store.load();
        let (changes, _) = watch::channel(AuthState::Anonymous);

        let authority = Self {
            inner: Arc::new(Inner {
                store,
                navigator,
                clock,
                runtime,
                check_interval,
                state: Mutex::new(State {
                    session: Session::anonymous(),
                    monitor: None,
                    generation: 0,
                    at_login_entry: false,
                }),
                changes,
            }),
        };

        if let Some(data) = persisted.data() {
            let now = authority.inner.clock.epoch_seconds();
            if data.is_expired_at(now) {
                info!(expires_at = data.expires_at(), now, "Persisted session already expired");
                authority.end_session(LogoutReason::Expired);
            } else {
                authority.restore(data.clone());
            }
        }

        Ok(authority)
    }

    fn restore(&self, data: SessionData) {
        let mut state = self.lock();
        state.generation += 1;
        state.monitor = Some(self.start_monitor(data.expires_at(), state.generation));
        info!(
            username = %data.claims().username,
            expires_at = data.expires_at(),
            "Session restored"
        );
        state.session = Session::authenticated(data);
        self.inner.changes.send_replace(AuthState::Authenticated);
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Start a session from a credential issued by the server.
    ///
    /// A credential that does not decode, is already expired, or cannot be
    /// persisted leaves the authority anonymous exactly as [`logout`] would.
    /// On success the user is sent to the dashboard.
    ///
    /// [`logout`]: SessionAuthority::logout
    pub fn login(&self, credential: &str) -> AuthState {
        let data = match SessionData::from_credential(credential) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Rejecting credential");
                self.end_session(LogoutReason::InvalidCredential);
                return AuthState::Anonymous;
            }
        };

        let now = self.inner.clock.epoch_seconds();
        if data.is_expired_at(now) {
            info!(expires_at = data.expires_at(), now, "Rejecting expired credential");
            self.end_session(LogoutReason::Expired);
            return AuthState::Anonymous;
        }

        let (outcome, redirect) = {
            let mut state = self.lock();
            if let Some(mut previous) = state.monitor.take() {
                previous.cancel();
            }

            let expires_at = data.expires_at();
            let username = data.claims().username.clone();
            let session = Session::authenticated(data);
            match self.inner.store.save(&session) {
                Ok(()) => {
                    state.generation += 1;
                    state.monitor = Some(self.start_monitor(expires_at, state.generation));
                    info!(%username, expires_at, "Session started");
                    state.session = session;
                    state.at_login_entry = false;
                    self.inner.changes.send_replace(AuthState::Authenticated);
                    (AuthState::Authenticated, Some(Route::dashboard()))
                }
                Err(e) => {
                    warn!(error = %e, "Failed to persist session");
                    let redirect = self.collapse(&mut state, LogoutReason::StorageFailure);
                    (AuthState::Anonymous, redirect)
                }
            }
        };

        self.navigate(redirect);
        outcome
    }

    /// End the session and send the user to the login view.
    ///
    /// Idempotent: storage is cleared every time, but the redirect is only
    /// issued if the last one did not already go to the login view.
    pub fn logout(&self) {
        self.end_session(LogoutReason::UserRequested);
    }

    /// End the session because the server rejected `rejected`, the
    /// credential the failed request was sent with (`None` if it was sent
    /// without one).
    ///
    /// A rejection of a credential that has since been replaced by a newer
    /// login leaves the newer session alone.
    pub fn handle_unauthorized(&self, rejected: Option<&str>) {
        let redirect = {
            let mut state = self.lock();
            let replaced = match (rejected, state.session.credential()) {
                (Some(rejected), Some(current)) => rejected != current,
                _ => false,
            };
            if replaced {
                debug!("Ignoring rejection of a replaced credential");
                return;
            }
            self.collapse(&mut state, LogoutReason::Unauthorized)
        };
        self.navigate(redirect);
    }

    fn end_session(&self, reason: LogoutReason) {
        let redirect = {
            let mut state = self.lock();
            self.collapse(&mut state, reason)
        };
        self.navigate(redirect);
    }

    /// Expiry callback from the monitor started for `generation`.
    fn expire(&self, generation: u64) {
        let redirect = {
            let mut state = self.lock();
            if state.generation != generation || !state.session.is_authenticated() {
                debug!(generation, "Ignoring expiry for a session that already ended");
                return;
            }
            self.collapse(&mut state, LogoutReason::Expired)
        };
        self.navigate(redirect);
    }

    /// Drop to anonymous under the lock. Returns the redirect to issue once
    /// the lock is released.
    fn collapse(&self, state: &mut State, reason: LogoutReason) -> Option<Route> {
        if let Some(mut monitor) = state.monitor.take() {
            monitor.cancel();
        }

        let was_authenticated = state.session.is_authenticated();
        state.session = Session::anonymous();

        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }

        self.inner.changes.send_if_modified(|current| {
            let changed = *current != AuthState::Anonymous;
            *current = AuthState::Anonymous;
            changed
        });

        if was_authenticated {
            info!(%reason, "Session ended");
        } else {
            debug!(%reason, "Logout while already anonymous");
        }

        if state.at_login_entry {
            debug!("Already at the login view, skipping redirect");
            None
        } else {
            state.at_login_entry = true;
            Some(Route::login())
        }
    }

    fn start_monitor(&self, expires_at: i64, generation: u64) -> ExpiryMonitor {
        let authority = Arc::downgrade(&self.inner);
        ExpiryMonitor::start(
            &self.inner.runtime,
            expires_at,
            Arc::clone(&self.inner.clock),
            self.inner.check_interval,
            move || {
                if let Some(inner) = authority.upgrade() {
                    SessionAuthority { inner }.expire(generation);
                }
            },
        )
    }

    fn navigate(&self, route: Option<Route>) {
        if let Some(route) = route {
            debug!(%route, "Redirecting");
            self.inner.navigator.go_to(&route);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    pub fn state(&self) -> AuthState {
        self.lock().session.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().session.is_authenticated()
    }

    /// The bearer credential, if signed in.
    pub fn credential(&self) -> Option<String> {
        self.lock().session.credential().map(str::to_string)
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.lock().session.profile()
    }

    /// Admin flag from the credential. Only drives UI; the server decides.
    pub fn is_admin(&self) -> bool {
        self.lock().session.claims().is_some_and(|c| c.is_admin)
    }

    /// Seconds until the credential expires, if signed in.
    pub fn seconds_remaining(&self) -> Option<i64> {
        let now = self.inner.clock.epoch_seconds();
        self.lock()
            .session
            .data()
            .map(|d| d.seconds_remaining(now))
    }

    /// Watch authentication state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.changes.subscribe()
    }

    /// True while an expiry check is pending.
    pub fn has_active_monitor(&self) -> bool {
        self.lock().monitor.as_ref().is_some_and(ExpiryMonitor::is_active)
    }
}

impl fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{CREDENTIAL_KEY, EXPIRY_KEY, PROFILE_KEY};
    use crate::ports::ManualClock;
    use crate::storage::MemoryStore;
    use crate::testing::{
        credential, credential_expiring_at, ReadOnlyStore, RecordingNavigator,
    };
    use serde_json::json;
    use tokio::time;

    const NOW: i64 = 1_700_000_000;

    struct Harness {
        storage: Arc<MemoryStore>,
        navigator: Arc<RecordingNavigator>,
        clock: Arc<ManualClock>,
        authority: SessionAuthority,
    }

    fn harness_with(storage: Arc<MemoryStore>) -> Harness {
        let navigator = Arc::new(RecordingNavigator::default());
        let clock = Arc::new(ManualClock::at(NOW));
        let authority = SessionAuthority::with_clock(
            storage.clone(),
            navigator.clone(),
            clock.clone(),
            DEFAULT_CHECK_INTERVAL,
        )
        .unwrap();
        Harness {
            storage,
            navigator,
            clock,
            authority,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_with_valid_credential() {
        let h = harness();

        let state = h.authority.login(&credential_expiring_at(NOW + 3600));

        assert_eq!(state, AuthState::Authenticated);
        assert!(h.authority.is_authenticated());
        assert_eq!(
            h.authority.profile(),
            Some(UserProfile {
                id: "u1".to_string(),
                username: "ana".to_string(),
                first_name: None,
                is_admin: false,
            })
        );
        assert_eq!(h.storage.len(), 3);
        assert_eq!(
            h.storage.get(EXPIRY_KEY).unwrap(),
            Some((NOW + 3600).to_string())
        );
        assert!(h.storage.get(CREDENTIAL_KEY).unwrap().is_some());
        assert!(h.storage.get(PROFILE_KEY).unwrap().is_some());
        assert_eq!(h.navigator.visits(), vec![Route::dashboard()]);
        assert!(h.authority.has_active_monitor());
        assert_eq!(h.authority.seconds_remaining(), Some(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_expiry_collapses() {
        let h = harness();

        let state = h
            .authority
            .login(&credential(json!({"sub": "u1", "username": "ana"})));

        assert_eq!(state, AuthState::Anonymous);
        assert!(!h.authority.is_authenticated());
        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.visits(), vec![Route::login()]);
        assert!(!h.authority.has_active_monitor());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_with_past_expiry_collapses() {
        for exp in [NOW - 3600, NOW - 1, NOW] {
            let h = harness_with(Arc::new(MemoryStore::with_entries([("stale", "x")])));

            assert_eq!(
                h.authority.login(&credential_expiring_at(exp)),
                AuthState::Anonymous
            );
            assert!(h.storage.is_empty());
            assert_eq!(h.navigator.visits(), vec![Route::login()]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_with_garbage_after_valid_session_logs_out() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 60));

        assert_eq!(h.authority.login("not-a-token"), AuthState::Anonymous);
        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.visits(), vec![Route::dashboard(), Route::login()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_logs_out_without_explicit_call() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 2));

        h.clock.advance(3);
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.authority.state(), AuthState::Anonymous);
        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.count(&Route::login()), 1);
        assert!(!h.authority.has_active_monitor());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_within_one_check_of_deadline() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 2));

        // One second before the deadline nothing happens
        h.clock.advance(1);
        time::sleep(Duration::from_secs(1)).await;
        assert!(h.authority.is_authenticated());

        // Reaching the deadline ends the session by the next check
        h.clock.advance(1);
        time::sleep(Duration::from_secs(1)).await;
        assert!(!h.authority.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_twice_redirects_once() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 3600));

        h.authority.logout();
        h.authority.logout();

        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.count(&Route::login()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_from_every_trigger_redirects_once() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 1));

        let credential = h.authority.credential();
        h.authority.handle_unauthorized(credential.as_deref());
        h.authority.logout();
        h.clock.advance(5);
        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(h.authority.state(), AuthState::Anonymous);
        assert_eq!(h.navigator.count(&Route::login()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_logouts_redirect_once() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 3600));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let authority = h.authority.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        authority.logout();
                    } else {
                        authority.handle_unauthorized(None);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.count(&Route::login()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_when_anonymous_clears_and_redirects() {
        let h = harness_with(Arc::new(MemoryStore::with_entries([("legacy", "1")])));

        h.authority.logout();

        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.visits(), vec![Route::login()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relogin_replaces_monitor() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 2));
        h.authority.login(&credential_expiring_at(NOW + 100));

        // The first credential's deadline passes; the second session survives
        h.clock.advance(5);
        time::sleep(Duration::from_secs(2)).await;
        assert!(h.authority.is_authenticated());
        assert_eq!(
            h.authority.session().claims().map(|c| c.expires_at),
            Some(NOW + 100)
        );

        h.clock.advance(100);
        time::sleep(Duration::from_secs(2)).await;
        assert!(!h.authority.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_of_replaced_credential_keeps_new_session() {
        let h = harness();
        let first = credential_expiring_at(NOW + 60);
        let second = credential_expiring_at(NOW + 120);
        h.authority.login(&first);
        h.authority.login(&second);

        h.authority.handle_unauthorized(Some(&first));
        assert_eq!(h.authority.credential(), Some(second.clone()));
        assert_eq!(h.navigator.count(&Route::login()), 0);

        h.authority.handle_unauthorized(Some(&second));
        assert!(!h.authority.is_authenticated());
        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.count(&Route::login()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_after_logout_redirects_again() {
        let h = harness();
        h.authority.login(&credential_expiring_at(NOW + 60));
        h.authority.logout();
        h.authority.login(&credential_expiring_at(NOW + 60));
        h.authority.logout();

        assert_eq!(
            h.navigator.visits(),
            vec![
                Route::dashboard(),
                Route::login(),
                Route::dashboard(),
                Route::login()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_after_restart() {
        let storage = Arc::new(MemoryStore::new());
        let first = harness_with(storage.clone());
        first.authority.login(&credential(json!({
            "sub": "u9",
            "username": "root",
            "first_name": "Rita",
            "is_admin": true,
            "exp": NOW + 600,
        })));
        drop(first);

        let second = harness_with(storage);
        assert!(second.authority.is_authenticated());
        assert!(second.authority.is_admin());
        let claims = second.authority.session().claims().cloned().unwrap();
        assert_eq!(claims.username, "root");
        assert_eq!(claims.expires_at, NOW + 600);
        assert!(second.navigator.visits().is_empty());
        assert!(second.authority.has_active_monitor());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_of_expired_session_logs_out_immediately() {
        let storage = Arc::new(MemoryStore::new());
        let session = Session::authenticated(
            SessionData::from_credential(credential_expiring_at(NOW - 10)).unwrap(),
        );
        SessionStore::new(storage.clone()).save(&session).unwrap();

        let h = harness_with(storage);
        assert_eq!(h.authority.state(), AuthState::Anonymous);
        assert_eq!(*h.authority.subscribe().borrow(), AuthState::Anonymous);
        assert!(h.storage.is_empty());
        assert_eq!(h.navigator.visits(), vec![Route::login()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_on_login_collapses() {
        let storage = Arc::new(ReadOnlyStore::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let authority = SessionAuthority::with_clock(
            storage.clone(),
            navigator.clone(),
            Arc::new(ManualClock::at(NOW)),
            DEFAULT_CHECK_INTERVAL,
        )
        .unwrap();

        assert_eq!(
            authority.login(&credential_expiring_at(NOW + 60)),
            AuthState::Anonymous
        );
        assert!(!authority.is_authenticated());
        assert!(!authority.has_active_monitor());
        assert_eq!(navigator.visits(), vec![Route::login()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_transitions() {
        let h = harness();
        let mut changes = h.authority.subscribe();
        assert_eq!(*changes.borrow(), AuthState::Anonymous);

        h.authority.login(&credential_expiring_at(NOW + 1));
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), AuthState::Authenticated);

        h.clock.advance(1);
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), AuthState::Anonymous);

        // A second logout is not a change
        h.authority.logout();
        assert!(!changes.has_changed().unwrap());
    }

    #[test]
    fn test_requires_runtime() {
        let result = SessionAuthority::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingNavigator::default()),
        );
        assert!(result.is_err());
    }
}
