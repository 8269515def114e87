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

//! The in-memory session table and its single lock.

use clipcards_core::Session;
use clipcards_core::UserId;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use crate::error::Fallible;
use crate::persist::PersistenceStore;
use crate::persist::Sessions;

/// Sole owner of mutable session state.
///
/// Every read and write goes through one async lock, so session operations
/// for all users serialize through here. The scheduler holds the lock
/// across an entire tick, card delivery included, which is what makes a
/// concurrent stop and tick resolve in lock-acquisition order.
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    persist: Box<dyn PersistenceStore>,
}

impl SessionStore {
    /// Load the session table from the persistence store.
    pub fn open(persist: Box<dyn PersistenceStore>) -> Fallible<Self> {
        let sessions = persist.load_all()?;
        Ok(SessionStore {
            sessions: Mutex::new(sessions),
            persist,
        })
    }

    /// Take the store lock.
    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            sessions: self.sessions.lock().await,
            persist: &*self.persist,
        }
    }

    /// Get-or-create the session for a user. Creation is flushed; an
    /// existing session is returned untouched.
    pub async fn ensure(&self, uid: UserId) -> Session {
        let mut guard = self.lock().await;
        if !guard.sessions.contains_key(&uid) {
            guard.sessions.insert(uid, Session::new());
            guard.flush();
        }
        guard.sessions[&uid].clone()
    }

    /// Snapshot of a user's session, if one exists.
    pub async fn get(&self, uid: UserId) -> Option<Session> {
        self.sessions.lock().await.get(&uid).cloned()
    }

    /// Mutate a user's session under the store lock, then flush.
    ///
    /// The session is created with defaults when missing, matching
    /// first-contact behavior.
    pub async fn update<T>(&self, uid: UserId, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut guard = self.lock().await;
        let session = guard.ensure(uid);
        let out = f(session);
        session.touch();
        guard.flush();
        out
    }

    /// Run a read over the whole session table.
    pub async fn with_sessions<T>(&self, f: impl FnOnce(&Sessions) -> T) -> T {
        let sessions = self.sessions.lock().await;
        f(&sessions)
    }
}

/// The held store lock.
///
/// Flush failures are logged and swallowed here: durability is
/// best-effort and must never fail a user-facing operation.
pub struct StoreGuard<'a> {
    sessions: MutexGuard<'a, Sessions>,
    persist: &'a dyn PersistenceStore,
}

impl StoreGuard<'_> {
    pub fn get(&self, uid: UserId) -> Option<&Session> {
        self.sessions.get(&uid)
    }

    pub fn get_mut(&mut self, uid: UserId) -> Option<&mut Session> {
        self.sessions.get_mut(&uid)
    }

    pub fn ensure(&mut self, uid: UserId) -> &mut Session {
        self.sessions.entry(uid).or_default()
    }

    /// Write the table out through the persistence store.
    pub fn flush(&self) {
        if let Err(e) = self.persist.flush(&self.sessions) {
            log::warn!("failed to persist sessions: {e}");
        }
    }
}
