// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::{SessionConfig, SESSION_FILE};

fn parse(args: &[&str]) -> SessionConfig {
    SessionConfig::parse_from(args)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&["unisched-session"]);
    config.validate()?;
    assert_eq!(config.api_url, "http://127.0.0.1:8000/api");
    assert_eq!(config.check_interval(), Duration::from_secs(60));
    assert_eq!(config.refresh_threshold(), Duration::from_secs(60));
    assert_eq!(config.logout_cooldown(), Duration::from_secs(2));
    assert_eq!(config.entry_route, "/login");
    assert!(config.remember_me());
    Ok(())
}

#[test]
fn typed_settings_follow_flags() -> anyhow::Result<()> {
    let config = parse(&[
        "unisched-session",
        "--check-interval-secs",
        "10",
        "--refresh-threshold-secs",
        "45",
        "--logout-cooldown-ms",
        "500",
        "--entry-route",
        "/signin",
        "--no-remember-me",
    ]);
    config.validate()?;

    let settings = config.supervisor_settings();
    assert_eq!(settings.check_interval, Duration::from_secs(10));
    assert_eq!(settings.refresh_threshold, Duration::from_secs(45));
    let options = config.session_options();
    assert_eq!(options.cooldown, Duration::from_millis(500));
    assert_eq!(options.entry_route, "/signin");
    assert!(!config.remember_me());
    Ok(())
}

#[test]
fn explicit_state_dir_wins() {
    let config = parse(&["unisched-session", "--state-dir", "/var/lib/unisched"]);
    assert_eq!(config.state_dir(), PathBuf::from("/var/lib/unisched"));
    assert_eq!(config.durable_path(), PathBuf::from("/var/lib/unisched").join(SESSION_FILE));
}

#[yare::parameterized(
    zero_interval       = { &["x", "--check-interval-secs", "0"], "greater than zero" },
    threshold_too_small = { &["x", "--check-interval-secs", "60", "--refresh-threshold-secs", "30"],
                            "must be at least" },
    zero_timeout        = { &["x", "--http-timeout-secs", "0"], "--http-timeout-secs" },
    email_only          = { &["x", "--email", "admin@example.edu"], "together" },
    password_only       = { &["x", "--password", "pw"], "together" },
    relative_route      = { &["x", "--entry-route", "login"], "must start with" },
    bad_log_format      = { &["x", "--log-format", "xml"], "invalid log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}
