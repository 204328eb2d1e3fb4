//! Set of sessions eligible to receive broadcasts.
//!
//! Iteration holds the read lock for its whole duration and removal needs
//! the write lock, so once `remove` returns the removed session is never
//! visited again.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatline_core::{ChatError, Result, SessionId};
use parking_lot::RwLock;

use crate::session::SessionHandle;

/// Registered sessions keyed by ID.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    /// Tracks membership without taking the lock for count queries.
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a session. A second `add` with the same ID is an error.
    pub fn add(&self, session: Arc<SessionHandle>) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(ChatError::DuplicateSession(session.id.clone()));
        }
        let _ = sessions.insert(session.id.clone(), session);
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Deregister a session. Absent IDs are a no-op.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Invoke `f` once per registered session.
    pub fn for_each_active(&self, mut f: impl FnMut(&Arc<SessionHandle>)) {
        let sessions = self.sessions.read();
        for session in sessions.values() {
            f(session);
        }
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    /// Whether a session is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// IDs of all registered sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Vec<Arc<SessionHandle>> {
        let drained: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        let _ = self.active_count.fetch_sub(drained.len(), Ordering::Relaxed);
        drained
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
