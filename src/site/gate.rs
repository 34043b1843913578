//! Per-visitor UI state: selected view, login dialog, passcode buffer.
//!
//! Nothing here is persisted; a restart resets every session.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::passcode_matches;

/// View selected by a visitor once the site has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    Public,
    Admin,
}

/// UI state for one visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSession {
    view: View,
    passcode: String,
    show_login: bool,
}

impl Default for UiSession {
    fn default() -> Self {
        Self {
            view: View::Public,
            passcode: String::new(),
            show_login: false,
        }
    }
}

impl UiSession {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn passcode(&self) -> &str {
        &self.passcode
    }

    pub fn show_login(&self) -> bool {
        self.show_login
    }

    pub fn open_login(&mut self) {
        self.show_login = true;
    }

    pub fn close_login(&mut self) {
        self.show_login = false;
    }

    pub fn set_passcode(&mut self, passcode: impl Into<String>) {
        self.passcode = passcode.into();
    }

    /// Enter the admin view if the buffer matches `expected`.
    ///
    /// On a mismatch nothing changes, the buffer included.
    pub fn attempt_login(&mut self, expected: &str) -> bool {
        if !passcode_matches(&self.passcode, expected) {
            return false;
        }
        self.view = View::Admin;
        self.show_login = false;
        self.passcode.clear();
        true
    }

    pub fn exit_admin(&mut self) {
        self.view = View::Public;
    }
}

struct Entry {
    session: UiSession,
    last_seen: Instant,
}

/// All live UI sessions, keyed by the id handed to the visitor.
///
/// A session untouched for longer than the idle TTL is gone: lookups treat
/// it as unknown, and every `create` sweeps expired entries out.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Entry>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub async fn create(&self) -> (Uuid, UiSession) {
        let id = Uuid::new_v4();
        let session = UiSession::default();
        let now = Instant::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle UI sessions");
        }

        sessions.insert(
            id,
            Entry {
                session: session.clone(),
                last_seen: now,
            },
        );
        (id, session)
    }

    pub async fn get(&self, id: Uuid) -> Option<UiSession> {
        self.update(id, |_| ()).await.map(|((), session)| session)
    }

    /// Apply `f` to a session, returning its result and the updated session.
    pub async fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut UiSession) -> R,
    ) -> Option<(R, UiSession)> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        if now.duration_since(entry.last_seen) > self.idle_ttl {
            sessions.remove(&id);
            return None;
        }

        entry.last_seen = now;
        let result = f(&mut entry.session);
        Some((result, entry.session.clone()))
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "admin123";

    #[test]
    fn test_correct_passcode_enters_admin_and_clears_buffer() {
        let mut session = UiSession::default();
        session.open_login();
        session.set_passcode("admin123");

        assert!(session.attempt_login(SECRET));
        assert_eq!(session.view(), View::Admin);
        assert_eq!(session.passcode(), "");
        assert!(!session.show_login());
    }

    #[test]
    fn test_wrong_passcode_keeps_state_and_buffer() {
        let mut session = UiSession::default();
        session.open_login();
        session.set_passcode("admin12");

        assert!(!session.attempt_login(SECRET));
        assert_eq!(session.view(), View::Public);
        assert_eq!(session.passcode(), "admin12");
        assert!(session.show_login());
    }

    #[test]
    fn test_exit_admin_returns_to_public() {
        let mut session = UiSession::default();
        session.set_passcode(SECRET);
        session.attempt_login(SECRET);

        session.exit_admin();
        assert_eq!(session.view(), View::Public);
    }

    #[tokio::test]
    async fn test_registry_update_and_remove() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let (id, session) = registry.create().await;
        assert_eq!(session.view(), View::Public);

        let (entered, updated) = registry
            .update(id, |s| {
                s.set_passcode(SECRET);
                s.attempt_login(SECRET)
            })
            .await
            .unwrap();
        assert!(entered);
        assert_eq!(updated.view(), View::Admin);
        assert_eq!(registry.get(id).await.unwrap().view(), View::Admin);

        assert!(registry.remove(id).await);
        assert!(registry.get(id).await.is_none());
        assert!(registry.update(id, |s| s.exit_admin()).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_session_is_evicted() {
        let registry = SessionRegistry::new(Duration::from_millis(100));
        let (idle, _) = registry.create().await;
        let (active, _) = registry.create().await;

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(registry.get(active).await.is_some());
        }

        assert!(registry.get(idle).await.is_none());
        assert!(registry.update(idle, |s| s.open_login()).await.is_none());
        assert!(registry.get(active).await.is_some());
    }

    #[tokio::test]
    async fn test_create_sweeps_expired_sessions() {
        let registry = SessionRegistry::new(Duration::from_millis(20));
        for _ in 0..5 {
            registry.create().await;
        }
        assert_eq!(registry.sessions.read().await.len(), 5);

        tokio::time::sleep(Duration::from_millis(40)).await;
        registry.create().await;
        assert_eq!(registry.sessions.read().await.len(), 1);
    }
}
