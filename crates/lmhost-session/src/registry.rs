//! Multi-tenant session storage.
//!
//! The registry exclusively owns all [`SessionState`] values. A generation
//! turn holds a non-owning handle (the `Arc`) for its duration; removing a
//! session from the map only unlinks it, so an in-flight turn finishes on
//! the detached state.
//!
//! There is no automatic eviction: sessions live until an explicit
//! [`remove`](SessionRegistry::remove) or [`remove_all`](SessionRegistry::remove_all).
//! Unbounded growth under many tenant ids is a known gap the calling layer
//! must police.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use lmhost_context::Retention;

use crate::state::SessionState;

/// Session id used when the caller does not supply one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Map from opaque session id to conversation state.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
    context_size: usize,
    vocab_size: usize,
    retention: Retention,
}

impl SessionRegistry {
    /// Create a registry producing sessions sized to the given model
    /// dimensions, with the given score retention mode.
    pub fn new(context_size: usize, vocab_size: usize, retention: Retention) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            context_size,
            vocab_size,
            retention,
        }
    }

    /// Fetch a session, creating it on first reference.
    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = id, "creating session");
                Arc::new(Mutex::new(SessionState::new(
                    id,
                    self.context_size,
                    self.vocab_size,
                    self.retention,
                )))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    /// Evict one session, clearing its buffers. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().unwrap().remove(id);
        if let Some(session) = &removed {
            session.lock().unwrap().reset();
        }
        removed.is_some()
    }

    /// Evict every session.
    pub fn remove_all(&self) {
        let drained: Vec<_> = self.sessions.write().unwrap().drain().collect();
        for (_, session) in drained {
            session.lock().unwrap().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}
