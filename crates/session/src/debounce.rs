// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exactly-once logout per episode.
//!
//! Several triggers (the user, the expiry supervisor, a 401 from any request)
//! can ask for a logout at nearly the same moment. The first one runs the
//! side effects; everything that arrives before the cooldown elapses is
//! dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default time after a logout during which further logouts are ignored.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Ready to accept a logout.
    Idle,
    /// Side effects are running right now.
    Firing,
    /// Side effects ran; new requests are no-ops until the cooldown ends.
    Cooldown,
}

impl DebounceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Firing => "firing",
            Self::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for DebounceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Inner {
    state: DebounceState,
    /// End of the current cooldown. Checked on every call so the machine
    /// still returns to idle when the reset task never got to run.
    until: Option<Instant>,
    /// Cancels the scheduled reset.
    pending: Option<CancellationToken>,
}

impl Inner {
    fn settle(&mut self) {
        if self.state == DebounceState::Cooldown
            && self.until.is_some_and(|until| Instant::now() >= until)
        {
            self.state = DebounceState::Idle;
            self.until = None;
            self.pending = None;
        }
    }
}

/// `Idle -> Firing -> Cooldown -> Idle` gate around a side-effecting action.
pub struct LogoutDebouncer {
    inner: Arc<Mutex<Inner>>,
    cooldown: Duration,
    shutdown: CancellationToken,
}

impl LogoutDebouncer {
    pub fn new(cooldown: Duration, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: DebounceState::Idle,
                until: None,
                pending: None,
            })),
            cooldown,
            shutdown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn state(&self) -> DebounceState {
        let mut inner = self.inner.lock();
        inner.settle();
        inner.state
    }

    /// Run `action` if idle, then start the cooldown.
    ///
    /// Returns `false` without running anything when a previous call is still
    /// firing or cooling down.
    pub fn fire(&self, action: impl FnOnce()) -> bool {
        self.fire_if(|| {
            action();
            true
        })
    }

    /// Like [`fire`](Self::fire), but `action` may decline by returning
    /// `false`; the gate then goes straight back to idle without a cooldown.
    pub fn fire_if(&self, action: impl FnOnce() -> bool) -> bool {
        {
            let mut inner = self.inner.lock();
            inner.settle();
            if inner.state != DebounceState::Idle {
                debug!(state = %inner.state, "logout already in progress, ignoring");
                return false;
            }
            inner.state = DebounceState::Firing;
        }

        if !action() {
            let mut inner = self.inner.lock();
            if inner.state == DebounceState::Firing {
                inner.state = DebounceState::Idle;
            }
            return false;
        }

        self.enter_cooldown();
        true
    }

    fn enter_cooldown(&self) {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.pending.take() {
            previous.cancel();
        }
        if self.cooldown.is_zero() {
            inner.state = DebounceState::Idle;
            inner.until = None;
            return;
        }

        inner.state = DebounceState::Cooldown;
        inner.until = Some(Instant::now() + self.cooldown);

        // Without a runtime the deadline alone brings the machine back.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cancel = self.shutdown.child_token();
        inner.pending = Some(cancel.clone());
        let shared = Arc::clone(&self.inner);
        let cooldown = self.cooldown;
        runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(cooldown) => {
                    let mut inner = shared.lock();
                    if inner.state == DebounceState::Cooldown {
                        inner.state = DebounceState::Idle;
                        inner.until = None;
                        inner.pending = None;
                        debug!("logout cooldown elapsed");
                    }
                }
            }
        });
    }
}

impl Drop for LogoutDebouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.lock().pending.take() {
            pending.cancel();
        }
    }
}

impl fmt::Debug for LogoutDebouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoutDebouncer")
            .field("state", &self.inner.lock().state)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod tests;
