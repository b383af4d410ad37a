//! Registry of live sessions.
//!
//! `SessionRegistry` is a cheaply cloneable handle over a concurrent map from
//! [`SessionId`] to [`Session`]. Creation and removal take the shard write
//! lock for the affected key only, so unrelated sessions never contend.
//! Sessions hold a weak reference back to the map and unregister themselves
//! when killed.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    metrics,
    session::{Session, SessionId},
};

pub(crate) type SessionMap = DashMap<SessionId, Arc<Session>>;

/// Concurrent map of live sessions keyed by [`SessionId`].
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Return the session for `id`, creating it with `timeout` if absent.
    ///
    /// Creation is idempotent: concurrent callers with the same id observe
    /// one session.
    pub(crate) fn get_or_create(&self, id: SessionId, timeout: Duration) -> Arc<Session> {
        let session = match self.sessions.entry(id) {
            Entry::Occupied(entry) => return Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let session = Arc::new(Session::new(
                    entry.key().clone(),
                    timeout,
                    Arc::downgrade(&self.sessions),
                ));
                entry.insert(Arc::clone(&session));
                session
            }
        };
        metrics::inc_sessions();
        log::info!("session {} created", session.id());
        session.spawn_watchdog();
        session
    }

    /// Allocate a session under a fresh random id.
    pub(crate) fn create(&self, timeout: Duration) -> Arc<Session> {
        self.get_or_create(SessionId::generate(), timeout)
    }

    /// Retrieve a live session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool { self.sessions.contains_key(id) }

    /// Unregister `id` without killing it; returns the removed session.
    ///
    /// [`Session::kill`] calls this itself, so callers normally kill instead.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    #[must_use]
    pub fn len(&self) -> usize { self.sessions.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }

    /// IDs of every registered session.
    #[must_use]
    pub fn active_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Kill every registered session; returns how many were killed.
    pub fn kill_all(&self) -> usize {
        // Collect first: kill() removes from the map and would deadlock on
        // a shard guard held by the iterator.
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions.iter().filter(|session| session.kill()).count()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("len", &self.len())
            .finish()
    }
}
