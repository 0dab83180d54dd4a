// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replaceable logout entry point for code that holds no session reference.
//!
//! The host creates one [`LogoutHandle`] at startup and hands clones of it to
//! collaborators such as [`crate::api::AuthorizedClient`]. The session
//! manager installs its own logout into the handle; until then a trigger is
//! a no-op.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::session::LogoutReason;

/// A logout implementation. Returns whether side effects actually ran.
pub type LogoutFn = Arc<dyn Fn(LogoutReason) -> bool + Send + Sync>;

/// Cloneable cell holding the current logout function.
#[derive(Clone)]
pub struct LogoutHandle {
    current: Arc<RwLock<LogoutFn>>,
}

impl LogoutHandle {
    pub fn new() -> Self {
        Self { current: Arc::new(RwLock::new(noop())) }
    }

    /// Replace the current function. The previous one is dropped, not chained.
    pub fn install(&self, logout: LogoutFn) {
        *self.current.write() = logout;
    }

    pub fn install_fn(&self, logout: impl Fn(LogoutReason) -> bool + Send + Sync + 'static) {
        self.install(Arc::new(logout));
    }

    /// Go back to the no-op.
    pub fn reset(&self) {
        self.install(noop());
    }

    /// Invoke whatever logout is currently installed.
    pub fn trigger(&self, reason: LogoutReason) -> bool {
        // Clone out so the lock is not held while the logout runs; it may
        // reinstall into this same handle.
        let logout = Arc::clone(&self.current.read());
        logout(reason)
    }
}

impl Default for LogoutHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogoutHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoutHandle").finish_non_exhaustive()
    }
}

fn noop() -> LogoutFn {
    Arc::new(|reason: LogoutReason| {
        debug!(%reason, "logout triggered with nothing installed");
        false
    })
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
