// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Durable storage for session state.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use clipcards_core::Session;
use clipcards_core::UserId;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Fallible;

/// Every known session, keyed by user.
pub type Sessions = BTreeMap<UserId, Session>;

/// Where sessions are read at startup and rewritten after every mutation.
///
/// Durability is best-effort: implementations must treat a missing or
/// unreadable store as empty rather than refuse to start.
pub trait PersistenceStore: Send + Sync {
    fn load_all(&self) -> Fallible<Sessions>;
    fn flush(&self, sessions: &Sessions) -> Fallible<()>;
}

/// On-disk layout: a single JSON document with a `users` map.
#[derive(Deserialize)]
struct Document {
    users: Sessions,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    users: &'a Sessions,
}

/// JSON-file store. Writes go through a sibling temp file and a rename, so
/// a crash mid-write leaves the previous document intact.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonStore { path: path.into() }
    }
}

impl PersistenceStore for JsonStore {
    fn load_all(&self) -> Fallible<Sessions> {
        if !self.path.exists() {
            return Ok(Sessions::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Document>(&contents) {
            Ok(document) => Ok(document.users),
            Err(e) => {
                log::warn!(
                    "session db {} is unreadable, starting empty: {e}",
                    self.path.display()
                );
                Ok(Sessions::new())
            }
        }
    }

    fn flush(&self, sessions: &Sessions) -> Fallible<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&DocumentRef { users: sessions })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store for tests. Clones share state, so a test can hand one
/// clone to a `SessionStore` and inspect the other.
#[cfg(test)]
#[derive(Clone)]
pub struct MemoryStore {
    inner: std::sync::Arc<MemoryInner>,
}

#[cfg(test)]
struct MemoryInner {
    sessions: std::sync::Mutex<Sessions>,
    flushes: std::sync::atomic::AtomicUsize,
    fail_flush: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: std::sync::Arc::new(MemoryInner {
                sessions: std::sync::Mutex::new(Sessions::new()),
                flushes: std::sync::atomic::AtomicUsize::new(0),
                fail_flush: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    pub fn seeded(sessions: Sessions) -> Self {
        let store = Self::new();
        *store.inner.sessions.lock().unwrap() = sessions;
        store
    }

    pub fn snapshot(&self) -> Sessions {
        self.inner.sessions.lock().unwrap().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.inner.flushes.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn set_fail_flush(&self, fail: bool) {
        self.inner
            .fail_flush
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl PersistenceStore for MemoryStore {
    fn load_all(&self) -> Fallible<Sessions> {
        Ok(self.snapshot())
    }

    fn flush(&self, sessions: &Sessions) -> Fallible<()> {
        use std::sync::atomic::Ordering;
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_flush.load(Ordering::SeqCst) {
            return crate::error::fail("disk on fire");
        }
        *self.inner.sessions.lock().unwrap() = sessions.clone();
        Ok(())
    }
}
