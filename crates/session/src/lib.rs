// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unisched session: client-side session and credential manager for the
//! scheduling console.

pub mod api;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod handle;
pub mod hooks;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod test_support;
pub mod token;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{AuthorizedClient, HttpAuthApi};
use crate::clock::SystemClock;
use crate::config::SessionConfig;
use crate::handle::LogoutHandle;
use crate::hooks::TracingHooks;
use crate::session::{LogoutReason, SessionEvent, SessionManager};
use crate::store::{FileStore, MemoryStore, SessionStores};
use crate::supervisor::ExpirySupervisor;

/// Initialize tracing from the configured level and format.
pub fn init_tracing(config: &SessionConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Everything the host wires together, before any network activity.
pub struct PreparedHost {
    pub session: Arc<SessionManager>,
    pub supervisor: Arc<ExpirySupervisor>,
    pub api: Arc<HttpAuthApi>,
    pub stores: SessionStores,
    pub logout: LogoutHandle,
    pub shutdown: CancellationToken,
}

/// Build the session over the durable file store and an in-memory
/// ephemeral store, adopting any persisted session.
pub fn prepare(config: &SessionConfig) -> anyhow::Result<PreparedHost> {
    let shutdown = CancellationToken::new();

    let durable = FileStore::open(config.durable_path());
    info!(path = %durable.path().display(), "durable session store");
    let stores = SessionStores::new(Arc::new(durable), Arc::new(MemoryStore::new()));

    let (session, _events) = SessionManager::new(
        stores.clone(),
        Arc::new(TracingHooks),
        config.session_options(),
        shutdown.clone(),
    );
    let logout = LogoutHandle::new();
    session.install_into(&logout);

    let api = Arc::new(HttpAuthApi::new(config.api_url.clone(), config.http_timeout())?);
    let supervisor = ExpirySupervisor::new(
        Arc::clone(&session),
        api.clone(),
        Arc::new(SystemClock),
        config.supervisor_settings(),
    );

    Ok(PreparedHost { session, supervisor, api, stores, logout, shutdown })
}

impl PreparedHost {
    /// Drop a stale persisted session, then log in with the configured
    /// credentials if nothing usable is left.
    pub async fn authenticate(&self, config: &SessionConfig) -> anyhow::Result<()> {
        self.supervisor.check_on_startup();
        if self.session.is_authenticated() {
            info!(scope = ?self.session.scope(), "using persisted session");
            return Ok(());
        }

        let (Some(email), Some(password)) = (&config.email, &config.password) else {
            anyhow::bail!("no persisted session; pass --email and --password to log in");
        };
        let result = self.api.login(email, password).await?;
        self.session.login(result, config.remember_me())?;
        Ok(())
    }

    /// Supervise the session until Ctrl-C or until it ends.
    pub async fn run(self, config: &SessionConfig) -> anyhow::Result<()> {
        let mut events = self.session.subscribe();
        let supervisor_task = self.supervisor.spawn(self.shutdown.clone());

        if let Some(ref path) = config.probe_path {
            let client = AuthorizedClient::new(
                config.api_url.clone(),
                self.stores.clone(),
                self.logout.clone(),
                config.http_timeout(),
            )?;
            match client.get_json(path).await {
                Ok(body) => info!(path = %path, "probe ok: {body}"),
                Err(e) => warn!(path = %path, "probe failed: {e:#}"),
            }
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, keeping session");
                    break;
                }
                event = events.recv() => match event {
                    Ok(SessionEvent::LoggedOut { reason }) => {
                        info!(%reason, "session ended");
                        break;
                    }
                    Ok(event) => info!(?event, "session event"),
                    Err(RecvError::Lagged(n)) => warn!(n, "missed session events"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.session.shutdown();
        self.logout.reset();
        supervisor_task.await?;
        Ok(())
    }
}

/// Run the session host until shutdown.
pub async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let host = prepare(&config)?;

    if config.logout {
        if !host.session.logout(LogoutReason::User) {
            warn!("logout already in progress");
        }
        return Ok(());
    }

    host.authenticate(&config).await?;
    host.run(&config).await
}
