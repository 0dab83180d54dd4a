// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::api::DEFAULT_API_URL;
use crate::session::{SessionOptions, DEFAULT_ENTRY_ROUTE};
use crate::supervisor::SupervisorSettings;

/// File name of the durable session store inside the state directory.
pub const SESSION_FILE: &str = "session.json";

/// Session host for the scheduling console: keeps an admin login alive.
#[derive(Debug, Clone, Parser)]
#[command(name = "unisched-session", version, about)]
pub struct SessionConfig {
    /// Backend API root.
    #[arg(long, env = "UNISCHED_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory for the durable session store.
    #[arg(long, env = "UNISCHED_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Seconds between access-token expiry checks.
    #[arg(long, env = "UNISCHED_CHECK_INTERVAL_SECS", default_value_t = 60)]
    pub check_interval_secs: u64,

    /// Refresh once fewer than this many seconds of token lifetime remain.
    #[arg(long, env = "UNISCHED_REFRESH_THRESHOLD_SECS", default_value_t = 60)]
    pub refresh_threshold_secs: u64,

    /// Window after a logout during which further logouts are ignored.
    #[arg(long, env = "UNISCHED_LOGOUT_COOLDOWN_MS", default_value_t = 2000)]
    pub logout_cooldown_ms: u64,

    /// Route the user is sent to after logout.
    #[arg(long, env = "UNISCHED_ENTRY_ROUTE", default_value = DEFAULT_ENTRY_ROUTE)]
    pub entry_route: String,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "UNISCHED_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Log in with this email when no session is persisted.
    #[arg(long, env = "UNISCHED_EMAIL")]
    pub email: Option<String>,

    /// Password for --email.
    #[arg(long, env = "UNISCHED_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Keep the session only in memory instead of persisting it.
    #[arg(long, env = "UNISCHED_NO_REMEMBER_ME")]
    pub no_remember_me: bool,

    /// End the persisted session and exit.
    #[arg(long)]
    pub logout: bool,

    /// API path fetched once with the session token after startup.
    #[arg(long, env = "UNISCHED_PROBE_PATH")]
    pub probe_path: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "UNISCHED_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "UNISCHED_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl SessionConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval_secs == 0 {
            anyhow::bail!("--check-interval-secs must be greater than zero");
        }
        // A token must not be able to go from fresh to expired between two
        // checks without one refresh attempt.
        if self.refresh_threshold_secs < self.check_interval_secs {
            anyhow::bail!(
                "--refresh-threshold-secs ({}) must be at least --check-interval-secs ({})",
                self.refresh_threshold_secs,
                self.check_interval_secs
            );
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("--http-timeout-secs must be greater than zero");
        }
        if self.email.is_some() != self.password.is_some() {
            anyhow::bail!("--email and --password must be given together");
        }
        if !self.entry_route.starts_with('/') {
            anyhow::bail!("--entry-route must start with '/': {}", self.entry_route);
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    pub fn logout_cooldown(&self) -> Duration {
        Duration::from_millis(self.logout_cooldown_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn remember_me(&self) -> bool {
        !self.no_remember_me
    }

    /// Resolved state directory: the flag, then `$XDG_STATE_HOME/unisched`,
    /// then `$HOME/.local/state/unisched`, then the working directory.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Some(xdg) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(xdg).join("unisched");
        }
        if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(home).join(".local/state/unisched");
        }
        PathBuf::from(".unisched")
    }

    pub fn durable_path(&self) -> PathBuf {
        self.state_dir().join(SESSION_FILE)
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            check_interval: self.check_interval(),
            refresh_threshold: self.refresh_threshold(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions { cooldown: self.logout_cooldown(), entry_route: self.entry_route.clone() }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
