use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::{ConnectionId, Session};

/// Live sessions keyed by connection. Shared between every connection task
/// and every pipe.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` under its connection id.
    ///
    /// Refused when the connection's outbound side is already gone or a
    /// session is registered for it; the caller owns the orphan and must
    /// close it.
    pub async fn register(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        if session.outbound().is_closed() {
            log::warn!(
                "Registry: connection {} closed before its session registered",
                session.id()
            );
            return false;
        }
        if sessions.contains_key(&session.id()) {
            log::warn!("Registry: session {} already exists", session.id());
            return false;
        }
        sessions.insert(session.id(), session);
        true
    }

    pub async fn lookup(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(&id)
    }

    /// Close the session for `id` and drop it from the registry. Calling it
    /// for an unknown or already removed id is a no-op.
    pub async fn teardown(&self, id: ConnectionId) {
        let Some(session) = self.lookup(id).await else {
            return;
        };
        session.close().await;
        if self.remove(id).await.is_some() {
            log::info!("Registry: removed session {}", id);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
