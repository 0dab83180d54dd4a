// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state machine: owns the token pair and user profile, persists
//! them in the scope chosen at login, and tears everything down on logout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::{LogoutDebouncer, DEFAULT_COOLDOWN};
use crate::error::SessionError;
use crate::handle::LogoutHandle;
use crate::hooks::{SessionHooks, LOGGED_OUT_MESSAGE};
use crate::store::{SessionStores, StorageScope, StoredSession, ACCESS_KEY, REFRESH_KEY};

/// Route the user is sent to after a logout.
pub const DEFAULT_ENTRY_ROUTE: &str = "/login";

/// What asked for a logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked for it.
    User,
    /// The stored access token had already expired at startup.
    Expired,
    /// The refresh call failed.
    RefreshFailed,
    /// A request came back 401.
    Unauthorized,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Expired => "expired",
            Self::RefreshFailed => "refresh_failed",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast whenever the authenticated state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { scope: StorageScope },
    Refreshed { scope: Option<StorageScope> },
    LoggedOut { reason: LogoutReason },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub refresh: String,
}

/// An already-obtained login response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginResult {
    #[serde(default)]
    pub tokens: Option<TokenPair>,
    #[serde(default)]
    pub user: serde_json::Value,
}

impl LoginResult {
    pub fn new(
        access: impl Into<String>,
        refresh: impl Into<String>,
        user: serde_json::Value,
    ) -> Self {
        Self { tokens: Some(TokenPair { access: access.into(), refresh: refresh.into() }), user }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long further logouts are ignored after one runs.
    pub cooldown: Duration,
    pub entry_route: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { cooldown: DEFAULT_COOLDOWN, entry_route: DEFAULT_ENTRY_ROUTE.to_owned() }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    access: Option<String>,
    refresh: Option<String>,
    user: Option<serde_json::Value>,
    scope: Option<StorageScope>,
    /// Bumped on every login and logout.
    generation: u64,
}

impl SessionState {
    fn adopt(&mut self, scope: StorageScope, session: StoredSession) {
        self.access = Some(session.access);
        self.refresh = Some(session.refresh);
        self.user = Some(session.user).filter(|user| !user.is_null());
        self.scope = Some(scope);
        self.generation += 1;
    }

    fn reset(&mut self) {
        self.access = None;
        self.refresh = None;
        self.user = None;
        self.scope = None;
        self.generation += 1;
    }
}

/// The single process-wide session.
pub struct SessionManager {
    state: RwLock<SessionState>,
    stores: SessionStores,
    hooks: Arc<dyn SessionHooks>,
    debouncer: LogoutDebouncer,
    event_tx: broadcast::Sender<SessionEvent>,
    entry_route: String,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Create the session, adopting whatever a previous process persisted.
    ///
    /// The durable scope is checked before the ephemeral one. Nothing here
    /// touches the network.
    pub fn new(
        stores: SessionStores,
        hooks: Arc<dyn SessionHooks>,
        options: SessionOptions,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, broadcast::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = broadcast::channel(64);

        let mut state = SessionState::default();
        let restored = [StorageScope::Durable, StorageScope::Ephemeral].into_iter().find_map(
            |scope| match stores.load(scope) {
                Ok(found) => found.map(|session| (scope, session)),
                Err(e) => {
                    warn!(scope = %scope, "failed to read persisted session: {e}");
                    None
                }
            },
        );
        if let Some((scope, session)) = restored {
            info!(scope = %scope, "restored persisted session");
            state.adopt(scope, session);
        }

        let manager = Arc::new(Self {
            state: RwLock::new(state),
            stores,
            hooks,
            debouncer: LogoutDebouncer::new(options.cooldown, shutdown.child_token()),
            event_tx,
            entry_route: options.entry_route,
            shutdown,
        });
        (manager, event_rx)
    }

    // -- Queries ---------------------------------------------------------------

    /// Whether an access token is held. Reads memory only.
    pub fn is_authenticated(&self) -> bool {
        self.state.read().access.is_some()
    }

    pub fn user(&self) -> Option<serde_json::Value> {
        self.state.read().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().access.clone()
    }

    pub fn scope(&self) -> Option<StorageScope> {
        self.state.read().scope
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// The token the expiry supervisor watches: memory first, then whatever
    /// the durable store holds.
    ///
    /// A complete durable session found while memory is empty is adopted, so
    /// a refresh of it has a session to land in. A token-only leftover is
    /// returned as is.
    pub fn supervised_access_token(&self) -> Option<String> {
        if let Some(access) = self.access_token() {
            return Some(access);
        }
        match self.stores.load(StorageScope::Durable) {
            Ok(Some(session)) => {
                let mut state = self.state.write();
                if state.access.is_none() {
                    info!("adopted durable session written outside this process");
                    state.adopt(StorageScope::Durable, session);
                }
                return state.access.clone();
            }
            Ok(None) => {}
            Err(e) => warn!("failed to read durable session: {e}"),
        }
        match self.stores.get(StorageScope::Durable).get(ACCESS_KEY) {
            Ok(access) => access,
            Err(e) => {
                warn!("failed to read durable access token: {e}");
                None
            }
        }
    }

    /// Refresh token from whichever store holds one, falling back to memory.
    pub fn stored_refresh_token(&self) -> Option<String> {
        self.stores.find(REFRESH_KEY).or_else(|| self.state.read().refresh.clone())
    }

    // -- Transitions -----------------------------------------------------------

    /// Adopt an already-obtained login response.
    ///
    /// `remember_me` selects the durable scope; the other scope is cleared.
    /// A response without both tokens changes nothing.
    pub fn login(&self, result: LoginResult, remember_me: bool) -> Result<(), SessionError> {
        let pair = result.tokens.ok_or_else(|| {
            SessionError::InvalidCredentialsResponse("response has no tokens".into())
        })?;
        if pair.access.is_empty() {
            return Err(SessionError::InvalidCredentialsResponse("access token is empty".into()));
        }
        if pair.refresh.is_empty() {
            return Err(SessionError::InvalidCredentialsResponse("refresh token is empty".into()));
        }

        let scope = StorageScope::from_remember_me(remember_me);
        let session = StoredSession { access: pair.access, refresh: pair.refresh, user: result.user };

        {
            let mut state = self.state.write();
            if let Err(e) = self.stores.save(scope, &session) {
                // Don't leave a partial triple behind; the previous session,
                // if any, stays where it was.
                if let Err(clear_err) = self.stores.get(scope).clear() {
                    warn!(scope = %scope, "failed to clear partial session: {clear_err}");
                }
                return Err(SessionError::Storage(format!("{scope}: {e:#}")));
            }
            if let Err(e) = self.stores.get(scope.other()).clear() {
                warn!(scope = %scope.other(), "failed to clear other session scope: {e}");
            }
            state.adopt(scope, session);
        }

        info!(scope = %scope, "logged in");
        let _ = self.event_tx.send(SessionEvent::LoggedIn { scope });
        Ok(())
    }

    /// Swap in a refreshed access token minted during `generation`.
    ///
    /// The token is written to whichever scope currently holds the session.
    /// Returns `false` and discards it when the session ended or was
    /// replaced since the refresh started.
    pub fn apply_refreshed_access(&self, generation: u64, access: String) -> bool {
        let scope = {
            let mut state = self.state.write();
            if state.generation != generation || state.access.is_none() {
                debug!(
                    started = generation,
                    current = state.generation,
                    "discarding refreshed token for a finished session"
                );
                return false;
            }
            let scope = self.stores.active_scope().or(state.scope);
            if let Some(scope) = scope {
                if let Err(e) = self.stores.get(scope).set(ACCESS_KEY, &access) {
                    warn!(scope = %scope, "failed to persist refreshed token: {e}");
                }
            }
            state.access = Some(access);
            scope
        };

        debug!(scope = ?scope, "access token refreshed");
        let _ = self.event_tx.send(SessionEvent::Refreshed { scope });
        true
    }

    /// Clear the session everywhere, notify the user and return to the entry
    /// route.
    ///
    /// Returns `false` if another logout ran within the cooldown; nothing
    /// happens in that case.
    pub fn logout(&self, reason: LogoutReason) -> bool {
        self.debouncer.fire_if(|| self.run_logout(None, reason))
    }

    /// Log out only if no login or logout happened since `generation`.
    ///
    /// A skipped logout does not start the cooldown.
    pub fn logout_if_current(&self, generation: u64, reason: LogoutReason) -> bool {
        self.debouncer.fire_if(|| self.run_logout(Some(generation), reason))
    }

    fn run_logout(&self, expected: Option<u64>, reason: LogoutReason) -> bool {
        {
            let mut state = self.state.write();
            if let Some(generation) = expected.filter(|g| *g != state.generation) {
                debug!(
                    started = generation,
                    current = state.generation,
                    %reason,
                    "session changed, skipping logout"
                );
                return false;
            }
            state.reset();
            if let Err(e) = self.stores.clear_all() {
                warn!("failed to clear persisted session: {e}");
            }
        }

        info!(%reason, "logged out");
        self.hooks.notify(LOGGED_OUT_MESSAGE);
        self.hooks.navigate(&self.entry_route);
        let _ = self.event_tx.send(SessionEvent::LoggedOut { reason });
        true
    }

    // -- Wiring ----------------------------------------------------------------

    /// Make `handle` route to this session's logout.
    ///
    /// The handle holds only a weak reference, so it never keeps a dropped
    /// session alive; triggering after that is a no-op.
    pub fn install_into(self: &Arc<Self>, handle: &LogoutHandle) {
        let session = Arc::downgrade(self);
        handle.install_fn(move |reason| {
            session.upgrade().is_some_and(|session| session.logout(reason))
        });
    }

    /// Stop background work tied to this session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("SessionManager")
            .field("authenticated", &state.access.is_some())
            .field("scope", &state.scope)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
