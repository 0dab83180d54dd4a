// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing side effects of a logout.

use tracing::info;

/// Message shown to the user whenever a logout runs.
pub const LOGGED_OUT_MESSAGE: &str = "Logged out.";

/// Sink for the notification and navigation a logout performs.
pub trait SessionHooks: Send + Sync {
    /// Show a short message to the user.
    fn notify(&self, message: &str);

    /// Move the user to `route`.
    fn navigate(&self, route: &str);
}

/// Hooks for a headless host: both effects become log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl SessionHooks for TracingHooks {
    fn notify(&self, message: &str) {
        info!(target: "unisched::notify", "{message}");
    }

    fn navigate(&self, route: &str) {
        info!(target: "unisched::navigate", route, "navigating");
    }
}
