// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: a key-value capability with a durable and an
//! ephemeral implementation.
//!
//! Both scopes hold the same three keys (`access`, `refresh`, `user`). Which
//! scope is live is implied by which one holds an access token; at most one
//! should at any time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";
pub const USER_KEY: &str = "user";

/// Every key a session scope owns.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_KEY, REFRESH_KEY, USER_KEY];

/// Lifetime of the backend a session is persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScope {
    /// Survives a process restart.
    Durable,
    /// Gone when the process ends.
    Ephemeral,
}

impl StorageScope {
    /// "Remember me" selects durable storage.
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self::Durable
        } else {
            Self::Ephemeral
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Durable => Self::Ephemeral,
            Self::Ephemeral => Self::Durable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String key-value storage with a fixed lifetime.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Write several keys as one unit.
    fn set_all(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove every session key.
    fn clear(&self) -> anyhow::Result<()> {
        for key in SESSION_KEYS {
            self.remove(key)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ephemeral
// ---------------------------------------------------------------------------

/// Process-memory store. Its contents end with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_owned(), (*value).to_owned());
        }
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut map = self.entries.lock();
        for key in SESSION_KEYS {
            map.remove(key);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Durable
// ---------------------------------------------------------------------------

/// JSON-file store. Every mutation rewrites the file atomically
/// (write tmp + rename); an empty store removes the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading whatever a previous process left.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// logged and treated as empty so a bad file can never keep the process
    /// from starting.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<BTreeMap<String, String>>(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), "failed to parse session file: {e}");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), "no persisted session: {e}");
                BTreeMap::new()
            }
        };
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if entries.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            debug!(path = %self.path.display(), "removed session file");
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "persisted session file");
        Ok(())
    }

    /// Apply `mutate` and write the result; memory is left untouched if the
    /// write fails.
    fn update(&self, mutate: impl FnOnce(&mut BTreeMap<String, String>)) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        mutate(&mut next);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        if !self.entries.lock().contains_key(key) {
            return Ok(());
        }
        self.update(|map| {
            map.remove(key);
        })
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_owned(), (*value).to_owned());
            }
        })
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.update(|map| {
            for key in SESSION_KEYS {
                map.remove(key);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Scope pair
// ---------------------------------------------------------------------------

/// A complete persisted session triple.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub access: String,
    pub refresh: String,
    pub user: serde_json::Value,
}

/// The durable and ephemeral stores, addressed by [`StorageScope`].
#[derive(Clone)]
pub struct SessionStores {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
}

impl SessionStores {
    pub fn new(durable: Arc<dyn KeyValueStore>, ephemeral: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// Both scopes in process memory. Nothing survives a restart.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn get(&self, scope: StorageScope) -> &dyn KeyValueStore {
        match scope {
            StorageScope::Durable => self.durable.as_ref(),
            StorageScope::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    /// The scope currently holding an access token, durable first.
    pub fn active_scope(&self) -> Option<StorageScope> {
        [StorageScope::Durable, StorageScope::Ephemeral].into_iter().find(|scope| {
            match self.get(*scope).get(ACCESS_KEY) {
                Ok(value) => value.is_some(),
                Err(e) => {
                    warn!(scope = %scope, "failed to read session store: {e}");
                    false
                }
            }
        })
    }

    /// Read the triple held by `scope`.
    ///
    /// Returns `None` unless both tokens are present; a token-only leftover
    /// is not a session. A missing or unparseable profile reads as `null`.
    pub fn load(&self, scope: StorageScope) -> anyhow::Result<Option<StoredSession>> {
        let store = self.get(scope);
        let (Some(access), Some(refresh)) = (store.get(ACCESS_KEY)?, store.get(REFRESH_KEY)?)
        else {
            return Ok(None);
        };
        let user = match store.get(USER_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(scope = %scope, "stored user profile is not JSON: {e}");
                serde_json::Value::Null
            }),
            None => serde_json::Value::Null,
        };
        Ok(Some(StoredSession { access, refresh, user }))
    }

    pub fn save(&self, scope: StorageScope, session: &StoredSession) -> anyhow::Result<()> {
        let user = serde_json::to_string(&session.user)?;
        self.get(scope).set_all(&[
            (ACCESS_KEY, session.access.as_str()),
            (REFRESH_KEY, session.refresh.as_str()),
            (USER_KEY, user.as_str()),
        ])
    }

    /// Look `key` up in the durable scope, then the ephemeral one.
    pub fn find(&self, key: &str) -> Option<String> {
        [StorageScope::Durable, StorageScope::Ephemeral].into_iter().find_map(|scope| {
            match self.get(scope).get(key) {
                Ok(value) => value,
                Err(e) => {
                    warn!(scope = %scope, key, "failed to read session store: {e}");
                    None
                }
            }
        })
    }

    /// Clear both scopes. Both are attempted even if the first fails.
    pub fn clear_all(&self) -> anyhow::Result<()> {
        let durable = self.durable.clear();
        let ephemeral = self.ephemeral.clear();
        durable.and(ephemeral)
    }
}

impl fmt::Debug for SessionStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStores").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
