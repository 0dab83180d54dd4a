// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expiry supervisor: keeps the access token fresh and ends the session when
//! it can't.
//!
//! Every check interval the supervisor decodes the access token's `exp` and,
//! when less than the refresh threshold remains, exchanges the refresh token
//! for a new access token. A failed refresh is the only way a tick forces a
//! logout. An undecodable token is logged and left alone.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::session::{LogoutReason, SessionManager};
use crate::token;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub check_interval: Duration,
    /// Refresh once less than this much lifetime remains.
    pub refresh_threshold: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self { check_interval: DEFAULT_CHECK_INTERVAL, refresh_threshold: DEFAULT_REFRESH_THRESHOLD }
    }
}

/// What a single check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No access token anywhere.
    NoSession,
    /// The access token's payload could not be decoded.
    Undecodable,
    /// Enough lifetime left; nothing to do.
    Fresh,
    /// A new access token was stored.
    Refreshed,
    /// A refresh succeeded but the session ended while it was in flight.
    Discarded,
    /// Refresh failed and the session was logged out.
    LoggedOut,
}

pub struct ExpirySupervisor {
    session: Arc<SessionManager>,
    api: Arc<dyn AuthApi>,
    clock: Arc<dyn Clock>,
    settings: SupervisorSettings,
}

impl ExpirySupervisor {
    pub fn new(
        session: Arc<SessionManager>,
        api: Arc<dyn AuthApi>,
        clock: Arc<dyn Clock>,
        settings: SupervisorSettings,
    ) -> Arc<Self> {
        Arc::new(Self { session, api, clock, settings })
    }

    pub fn settings(&self) -> SupervisorSettings {
        self.settings
    }

    /// Log out straight away if the stored token has already expired.
    ///
    /// No refresh is attempted. Returns whether a logout ran.
    pub fn check_on_startup(&self) -> bool {
        let Some(access) = self.session.supervised_access_token() else {
            return false;
        };
        let exp = match token::decode_expiry(&access) {
            Ok(exp) => exp,
            Err(e) => {
                warn!("skipping startup expiry check: {e}");
                return false;
            }
        };
        let now = self.clock.now_secs();
        if exp >= now {
            return false;
        }
        info!(expired_secs_ago = now - exp, "stored access token already expired");
        self.session.logout(LogoutReason::Expired)
    }

    /// Run one check.
    pub async fn tick(&self) -> TickOutcome {
        let Some(access) = self.session.supervised_access_token() else {
            return TickOutcome::NoSession;
        };
        let time_left = match token::seconds_left(&access, self.clock.now_secs()) {
            Ok(secs) => secs,
            Err(e) => {
                warn!("cannot check token expiry: {e}");
                return TickOutcome::Undecodable;
            }
        };
        let threshold = i64::try_from(self.settings.refresh_threshold.as_secs()).unwrap_or(i64::MAX);
        if time_left >= threshold {
            debug!(time_left, "access token still fresh");
            return TickOutcome::Fresh;
        }

        debug!(time_left, "access token near expiry, refreshing");
        let generation = self.session.generation();
        match self.refresh().await {
            Ok(access) => {
                if self.session.apply_refreshed_access(generation, access) {
                    info!("access token refreshed");
                    TickOutcome::Refreshed
                } else {
                    TickOutcome::Discarded
                }
            }
            Err(e) => {
                warn!("{e}");
                if self.session.logout_if_current(generation, LogoutReason::RefreshFailed) {
                    TickOutcome::LoggedOut
                } else {
                    TickOutcome::Discarded
                }
            }
        }
    }

    async fn refresh(&self) -> Result<String, SessionError> {
        let refresh_token = self
            .session
            .stored_refresh_token()
            .ok_or_else(|| SessionError::RefreshFailure("no refresh token stored".into()))?;
        self.api
            .refresh(&refresh_token)
            .await
            .map_err(|e| SessionError::RefreshFailure(format!("{e:#}")))
    }

    /// Tick every check interval until `shutdown` is cancelled. The first
    /// tick comes one full interval after start.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.settings.check_interval;
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.tick() => debug!(?outcome, "expiry check"),
            }
        }
        debug!("expiry supervisor stopped");
    }

    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }
}

impl std::fmt::Debug for ExpirySupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySupervisor").field("settings", &self.settings).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
