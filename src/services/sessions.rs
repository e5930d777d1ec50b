use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::models::Session;

// Holding the lock makes a turn the only writer for its session.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

pub trait SessionStore: Send + Sync {
    fn create(&self) -> SessionHandle;

    /// Returns `None` for unknown or idle-expired sessions.
    fn get(&self, id: &str) -> Option<SessionHandle>;

    fn put(&self, session: Session) -> SessionHandle;

    fn delete(&self, id: &str);

    /// Pushes the idle deadline out again. Returns false if the session is gone.
    fn touch_expiry(&self, id: &str) -> bool;

    fn purge_expired(&self) -> usize;
}

struct Entry {
    session: SessionHandle,
    expires_at: Instant,
}

pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    idle: Duration,
}

impl InMemorySessionStore {
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self) -> SessionHandle {
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "evicted idle sessions");
        }
        self.put(Session::new(uuid::Uuid::new_v4().to_string()))
    }

    fn get(&self, id: &str) -> Option<SessionHandle> {
        let mut entries = self.entries();
        let expired = entries.get(id)?.expires_at <= Instant::now();
        if expired {
            entries.remove(id);
            tracing::info!(session_id = %id, "session expired");
            return None;
        }
        entries.get(id).map(|e| Arc::clone(&e.session))
    }

    fn put(&self, session: Session) -> SessionHandle {
        let id = session.id.clone();
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        self.entries().insert(
            id,
            Entry {
                session: Arc::clone(&handle),
                expires_at: Instant::now() + self.idle,
            },
        );
        handle
    }

    fn delete(&self, id: &str) {
        self.entries().remove(id);
    }

    fn touch_expiry(&self, id: &str) -> bool {
        match self.entries().get_mut(id) {
            Some(entry) => {
                entry.expires_at = Instant::now() + self.idle;
                true
            }
            None => false,
        }
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let handle = store.create();
        let id = handle.lock().await.id.clone();
        assert_eq!(id.len(), 36);

        let again = store.get(&id).unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let store = InMemorySessionStore::new(Duration::ZERO);
        let handle = store.put(Session::new("s-1"));
        drop(handle);
        assert!(store.get("s-1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_and_delete() {
        let store = InMemorySessionStore::new(Duration::ZERO);
        store.put(Session::new("a"));
        store.put(Session::new("b"));
        assert_eq!(store.purge_expired(), 2);

        let store = InMemorySessionStore::new(Duration::from_secs(60));
        store.put(Session::new("a"));
        assert!(store.touch_expiry("a"));
        store.delete("a");
        assert!(!store.touch_expiry("a"));
        assert_eq!(store.purge_expired(), 0);
    }
}
