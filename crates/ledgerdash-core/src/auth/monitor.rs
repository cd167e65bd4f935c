//! Background expiry detection.
//!
//! The monitor re-checks the clock at a fixed granularity rather than
//! sleeping until the expiry, so a clock that jumps (suspend/resume, manual
//! clocks in tests) is picked up on the next check.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::ports::Clock;

/// Default interval between expiry checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest interval accepted; a zero interval would spin.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// A running expiry check. Dropping it cancels the check.
#[derive(Debug)]
pub struct ExpiryMonitor {
    handle: Option<JoinHandle<()>>,
}

impl ExpiryMonitor {
    /// Spawn a check on `runtime` that calls `on_expired` once the clock
    /// reaches `expires_at`. The first check runs immediately.
    pub fn start<F>(
        runtime: &Handle,
        expires_at: i64,
        clock: Arc<dyn Clock>,
        interval: Duration,
        on_expired: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let period = interval.max(MIN_CHECK_INTERVAL);
        let handle = runtime.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now = clock.epoch_seconds();
                trace!(now, expires_at, "Expiry check");
                if now >= expires_at {
                    debug!(now, expires_at, "Credential expired");
                    on_expired();
                    return;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// True while the check is still waiting for the expiry.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the check. Safe to call any number of times.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}
