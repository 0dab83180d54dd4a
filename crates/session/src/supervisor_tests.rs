// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::session::{LoginResult, SessionEvent};
use crate::store::{
    KeyValueStore, SessionStores, StorageScope, StoredSession, ACCESS_KEY, REFRESH_KEY,
};
use crate::test_support::{
    token_expiring_at, unsigned_token, ManualClock, MockAuthApi, TestSession,
};

const NOW: u64 = 1_750_000_000;

fn login_expiring_in(t: &TestSession, secs: u64, remember_me: bool) -> anyhow::Result<()> {
    let result =
        LoginResult::new(token_expiring_at(NOW + secs), "ref.resh.tok", serde_json::json!({}));
    t.session.login(result, remember_me)?;
    Ok(())
}

fn supervisor(t: &TestSession, api: &Arc<MockAuthApi>) -> Arc<ExpirySupervisor> {
    ExpirySupervisor::new(
        Arc::clone(&t.session),
        api.clone(),
        Arc::new(ManualClock::new(NOW)),
        SupervisorSettings::default(),
    )
}

#[tokio::test]
async fn no_token_does_nothing() {
    let t = TestSession::new();
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));
    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::NoSession);
    assert_eq!(api.calls(), 0);
}

#[tokio::test]
async fn refreshes_inside_threshold() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 30, true)?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::Refreshed);

    assert_eq!(api.calls(), 1);
    assert_eq!(t.session.access_token().as_deref(), Some("new.acc.tok"));
    assert_eq!(t.durable.get(ACCESS_KEY)?.as_deref(), Some("new.acc.tok"));
    Ok(())
}

#[tokio::test]
async fn leaves_fresh_token_alone() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 120, true)?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::Fresh);
    assert_eq!(api.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn threshold_boundary_is_exclusive() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 60, true)?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::Fresh);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_logs_out_and_clears_both_scopes() -> anyhow::Result<()> {
    let mut t = TestSession::new();
    login_expiring_in(&t, 30, false)?;
    t.drain_events();
    let durable_clears = t.durable.clears();
    let ephemeral_clears = t.ephemeral.clears();
    let api = Arc::new(MockAuthApi::failing("refresh failed (401 Unauthorized)"));

    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::LoggedOut);

    assert!(!t.session.is_authenticated());
    assert_eq!(t.durable.clears(), durable_clears + 1);
    assert_eq!(t.ephemeral.clears(), ephemeral_clears + 1);
    assert_eq!(t.ephemeral.get(REFRESH_KEY)?, None);
    assert_eq!(t.hooks.navigations(), vec!["/login"]);
    assert_eq!(
        t.drain_events(),
        vec![SessionEvent::LoggedOut { reason: LogoutReason::RefreshFailed }]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_refresh_token_is_a_refresh_failure() -> anyhow::Result<()> {
    let t = TestSession::new();
    t.durable.set(ACCESS_KEY, &token_expiring_at(NOW + 10))?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::LoggedOut);
    assert_eq!(api.calls(), 0);
    assert_eq!(t.durable.get(ACCESS_KEY)?, None);
    Ok(())
}

#[tokio::test]
async fn malformed_token_is_not_fatal() -> anyhow::Result<()> {
    let t = TestSession::new();
    t.session.login(LoginResult::new("opaque", "ref.resh.tok", serde_json::json!({})), true)?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));
    let sup = supervisor(&t, &api);

    assert_eq!(sup.tick().await, TickOutcome::Undecodable);
    assert_eq!(sup.tick().await, TickOutcome::Undecodable);
    assert!(t.session.is_authenticated());
    assert_eq!(api.calls(), 0);
    assert!(t.hooks.notifications().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn startup_check_logs_out_stale_token_without_refresh() -> anyhow::Result<()> {
    let t = TestSession::new();
    t.session.login(
        LoginResult::new(token_expiring_at(NOW - 1), "ref.resh.tok", serde_json::json!({})),
        true,
    )?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    assert!(supervisor(&t, &api).check_on_startup());
    assert!(!t.session.is_authenticated());
    assert_eq!(api.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn startup_check_keeps_valid_and_malformed_tokens() -> anyhow::Result<()> {
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    let t = TestSession::new();
    login_expiring_in(&t, 5, true)?;
    assert!(!supervisor(&t, &api).check_on_startup());
    assert!(t.session.is_authenticated());

    let t = TestSession::new();
    t.session.login(LoginResult::new("opaque", "r", serde_json::json!({})), true)?;
    assert!(!supervisor(&t, &api).check_on_startup());
    assert!(t.session.is_authenticated());

    assert!(!supervisor(&TestSession::new(), &api).check_on_startup());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refresh_landing_after_logout_is_discarded() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 30, true)?;
    let (mock, gate) = MockAuthApi::succeeding("late.acc.tok").gated();
    let api = Arc::new(mock);
    let sup = supervisor(&t, &api);

    let ticking = Arc::clone(&sup);
    let tick = tokio::spawn(async move { ticking.tick().await });
    while api.calls() == 0 {
        tokio::task::yield_now().await;
    }

    assert!(t.session.logout(LogoutReason::User));
    gate.notify_one();

    assert_eq!(tick.await?, TickOutcome::Discarded);
    assert!(!t.session.is_authenticated());
    assert_eq!(t.durable.get(ACCESS_KEY)?, None);
    assert_eq!(t.hooks.notifications().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_after_relogin_leaves_new_session() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 30, true)?;
    let (mock, gate) = MockAuthApi::failing("boom").gated();
    let api = Arc::new(mock);
    let sup = supervisor(&t, &api);

    let ticking = Arc::clone(&sup);
    let tick = tokio::spawn(async move { ticking.tick().await });
    while api.calls() == 0 {
        tokio::task::yield_now().await;
    }

    login_expiring_in(&t, 3_600, true)?;
    gate.notify_one();

    assert_eq!(tick.await?, TickOutcome::Discarded);
    assert!(t.session.is_authenticated());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_loop_first_tick_after_one_interval() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 30, true)?;
    let api = Arc::new(MockAuthApi::succeeding(token_expiring_at(NOW + 3_600)));
    let shutdown = CancellationToken::new();
    let handle = supervisor(&t, &api).spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(api.calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(api.calls(), 1);

    // The refreshed token is fresh, so later ticks leave it alone.
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(api.calls(), 1);

    shutdown.cancel();
    handle.await?;
    Ok(())
}

#[tokio::test]
async fn token_ages_into_threshold() -> anyhow::Result<()> {
    let t = TestSession::new();
    login_expiring_in(&t, 300, true)?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));
    let clock = Arc::new(ManualClock::new(NOW));
    let sup = ExpirySupervisor::new(
        Arc::clone(&t.session),
        api.clone(),
        clock.clone(),
        SupervisorSettings::default(),
    );

    assert_eq!(sup.tick().await, TickOutcome::Fresh);
    clock.advance(200);
    assert_eq!(sup.tick().await, TickOutcome::Fresh);
    clock.advance(60);
    assert_eq!(sup.tick().await, TickOutcome::Refreshed);
    assert_eq!(api.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn durable_session_outside_memory_is_refreshed_once() -> anyhow::Result<()> {
    let t = TestSession::new();
    SessionStores::new(t.durable.clone(), t.ephemeral.clone()).save(
        StorageScope::Durable,
        &StoredSession {
            access: token_expiring_at(NOW + 10),
            refresh: "ref.resh.tok".into(),
            user: serde_json::json!({}),
        },
    )?;
    let fresh = token_expiring_at(NOW + 3_600);
    let api = Arc::new(MockAuthApi::succeeding(fresh.clone()));
    let sup = supervisor(&t, &api);

    assert_eq!(sup.tick().await, TickOutcome::Refreshed);
    assert_eq!(sup.tick().await, TickOutcome::Fresh);
    assert_eq!(sup.tick().await, TickOutcome::Fresh);

    assert_eq!(api.calls(), 1);
    assert_eq!(t.durable.get(ACCESS_KEY)?, Some(fresh.clone()));
    assert_eq!(t.durable.get(REFRESH_KEY)?.as_deref(), Some("ref.resh.tok"));
    assert_eq!(t.session.access_token(), Some(fresh));
    Ok(())
}

#[tokio::test]
async fn far_future_token_is_fresh() -> anyhow::Result<()> {
    let t = TestSession::new();
    let far = unsigned_token(&serde_json::json!({ "exp": 10_000_000_000_000_000_000u64 }));
    t.session.login(LoginResult::new(far, "ref.resh.tok", serde_json::json!({})), true)?;
    let api = Arc::new(MockAuthApi::succeeding("new.acc.tok"));

    assert_eq!(supervisor(&t, &api).tick().await, TickOutcome::Fresh);
    assert!(!supervisor(&t, &api).check_on_startup());
    assert_eq!(api.calls(), 0);
    Ok(())
}
