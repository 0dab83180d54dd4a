// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes and builders shared by unit and integration tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::api::AuthApi;
use crate::clock::Clock;
use crate::hooks::SessionHooks;
use crate::session::{SessionEvent, SessionManager, SessionOptions};
use crate::store::{KeyValueStore, MemoryStore, SessionStores};

// -- Tokens -------------------------------------------------------------------

/// A three-segment token with `claims` as its payload and a junk signature.
pub fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// A token whose `exp` claim is `exp` Unix seconds.
pub fn token_expiring_at(exp: u64) -> String {
    unsigned_token(&serde_json::json!({ "exp": exp, "token_type": "access" }))
}

// -- Clock --------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_secs: u64) -> Self {
        Self { now: AtomicU64::new(now_secs) }
    }

    pub fn set(&self, now_secs: u64) {
        self.now.store(now_secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// -- Hooks --------------------------------------------------------------------

/// Records every notification and navigation.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    notifications: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }
}

impl SessionHooks for RecordingHooks {
    fn notify(&self, message: &str) {
        self.notifications.lock().push(message.to_owned());
    }

    fn navigate(&self, route: &str) {
        self.navigations.lock().push(route.to_owned());
    }
}

// -- Stores -------------------------------------------------------------------

/// In-memory store that counts `clear` calls.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    clears: AtomicU32,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::Relaxed)
    }
}

impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.clears.fetch_add(1, Ordering::Relaxed);
        self.inner.clear()
    }
}

/// Store whose writes always fail.
#[derive(Debug, Default)]
pub struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> anyhow::Result<()> {
        anyhow::bail!("read-only store refused {key}")
    }

    fn remove(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

// -- Auth endpoint ------------------------------------------------------------

/// Scripted refresh endpoint. Responses are consumed in order; the last one
/// repeats once the script runs out.
#[derive(Debug, Default)]
pub struct MockAuthApi {
    responses: Mutex<Vec<Result<String, String>>>,
    calls: AtomicU32,
    gate: Option<Arc<Notify>>,
}

impl MockAuthApi {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self { responses: Mutex::new(responses), calls: AtomicU32::new(0), gate: None }
    }

    pub fn succeeding(access: impl Into<String>) -> Self {
        Self::new(vec![Ok(access.into())])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(vec![Err(message.into())])
    }

    /// Every call blocks until the returned `Notify` is signalled.
    pub fn gated(self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (Self { gate: Some(Arc::clone(&gate)), ..self }, gate)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<String, String> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let responses = self.responses.lock();
        responses
            .get(index)
            .or_else(|| responses.last())
            .cloned()
            .unwrap_or_else(|| Err("no scripted response".to_owned()))
    }
}

impl AuthApi for MockAuthApi {
    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let response = self.next_response();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            response.map_err(|e| anyhow::anyhow!(e))
        })
    }
}

// -- Session ------------------------------------------------------------------

/// A session fixture with handles on its stores and hooks.
pub struct TestSession {
    pub session: Arc<SessionManager>,
    pub events: tokio::sync::broadcast::Receiver<SessionEvent>,
    pub durable: Arc<CountingStore>,
    pub ephemeral: Arc<CountingStore>,
    pub hooks: Arc<RecordingHooks>,
    pub shutdown: CancellationToken,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_stores(CountingStore::new(), CountingStore::new())
    }

    /// Build over pre-populated stores, so boot reconciliation sees them.
    pub fn with_stores(durable: Arc<CountingStore>, ephemeral: Arc<CountingStore>) -> Self {
        let hooks = RecordingHooks::new();
        let shutdown = CancellationToken::new();
        let stores = SessionStores::new(durable.clone(), ephemeral.clone());
        let (session, events) =
            SessionManager::new(stores, hooks.clone(), SessionOptions::default(), shutdown.clone());
        Self { session, events, durable, ephemeral, hooks, shutdown }
    }

    /// Drain buffered events.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

// -- Assertions ---------------------------------------------------------------

/// Assert that `$expr` is an `Err` whose message contains `$substr`.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
