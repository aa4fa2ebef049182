//! Session token storage and screen gating
//!
//! The token lives in a single file under the app data directory; the session
//! state machine lives in memory and is authoritative for the current
//! process. Persistence is best-effort: a failed write costs the next
//! process start its session, never this one.

use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// File name for the stored credential, one opaque string.
const TOKEN_FILE: &str = "auth_token";

/// Durable storage for the session token.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(app_data_dir: &Path) -> Self {
        Self {
            path: app_data_dir.join(TOKEN_FILE),
        }
    }

    /// Read the stored token. Any failure (missing file, unreadable storage)
    /// is treated as "no token"; non-trivial errors are logged.
    pub async fn load(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                eprintln!("Failed to read session token from {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub async fn save(&self, token: &str) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create data directory: {}", e))?;
        }
        tokio::fs::write(&self.path, token)
            .await
            .map_err(|e| format!("Failed to write session token: {}", e))
    }

    pub async fn clear(&self) -> Result<(), String> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to remove session token: {}", e)),
        }
    }
}

/// Session lifecycle. `Unknown` only exists between process start and the
/// first storage load; it is never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Authenticated,
    Anonymous,
}

/// The two mutually exclusive screen groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenGroup {
    /// Login and register screens.
    Auth,
    /// Everything behind a session: task list, forms, profile.
    Main,
}

/// Decides which screen group is reachable from the current session state.
///
/// Constructed once at startup and passed by reference into the surfaces that
/// need it. State transitions are synchronous; persistence happens in the
/// background so the UI never waits on storage.
pub struct SessionGate {
    store: SessionStore,
    token: Option<String>,
    status: SessionStatus,
}

impl SessionGate {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            token: None,
            status: SessionStatus::Unknown,
        }
    }

    /// Resolve `Unknown` from storage. Exactly one transition happens per
    /// process; calling this again after resolution changes nothing.
    pub async fn load(&mut self) -> SessionStatus {
        if self.status == SessionStatus::Unknown {
            match self.store.load().await {
                Some(token) => {
                    self.token = Some(token);
                    self.status = SessionStatus::Authenticated;
                }
                None => {
                    self.status = SessionStatus::Anonymous;
                }
            }
        }
        self.status
    }

    /// Login/logout. The in-memory transition is immediate; the returned
    /// handle resolves when the background persistence attempt finishes
    /// (batch callers await it before exiting, the TUI drops it).
    pub fn set_token(&mut self, token: Option<String>) -> JoinHandle<()> {
        let token = token.filter(|t| !t.is_empty());
        self.token = token.clone();
        self.status = match self.token {
            Some(_) => SessionStatus::Authenticated,
            None => SessionStatus::Anonymous,
        };

        let store = self.store.clone();
        tokio::spawn(async move {
            let result = match token {
                Some(token) => store.save(&token).await,
                None => store.clear().await,
            };
            if let Err(e) = result {
                // Non-fatal: the in-memory session already moved on.
                eprintln!("{}", e);
            }
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Screen group the current status demands, or `None` while the initial
    /// load is still in flight (no routing decision may be made yet).
    pub fn required_group(&self) -> Option<ScreenGroup> {
        match self.status {
            SessionStatus::Unknown => None,
            SessionStatus::Authenticated => Some(ScreenGroup::Main),
            SessionStatus::Anonymous => Some(ScreenGroup::Auth),
        }
    }

    /// Idempotent routing decision: `Some(target)` only when the current
    /// screen group does not match the required one. Staying put when the
    /// groups already agree is what prevents redirect loops.
    pub fn route(&self, current: ScreenGroup) -> Option<ScreenGroup> {
        match self.required_group() {
            Some(required) if required != current => Some(required),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().await, None);
        store.save("tok123").await.unwrap();
        assert_eq!(store.load().await, Some("tok123".to_string()));
        store.clear().await.unwrap();
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_store_clear_is_idempotent() {
        let (_dir, store) = temp_store();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_gate_resolves_anonymous_without_token() {
        let (_dir, store) = temp_store();
        let mut gate = SessionGate::new(store);
        assert_eq!(gate.status(), SessionStatus::Unknown);
        assert_eq!(gate.required_group(), None);

        assert_eq!(gate.load().await, SessionStatus::Anonymous);
        assert_eq!(gate.required_group(), Some(ScreenGroup::Auth));
    }

    #[tokio::test]
    async fn test_gate_resolves_authenticated_with_stored_token() {
        let (_dir, store) = temp_store();
        store.save("stored").await.unwrap();
        let mut gate = SessionGate::new(store);
        assert_eq!(gate.load().await, SessionStatus::Authenticated);
        assert_eq!(gate.token(), Some("stored"));
        assert_eq!(gate.required_group(), Some(ScreenGroup::Main));
    }

    #[tokio::test]
    async fn test_gate_load_resolves_only_once() {
        let (_dir, store) = temp_store();
        let mut gate = SessionGate::new(store.clone());
        gate.load().await;
        assert_eq!(gate.status(), SessionStatus::Anonymous);

        // A token written after resolution must not flip a live session.
        store.save("late").await.unwrap();
        assert_eq!(gate.load().await, SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_set_token_transitions_and_persists() {
        let (_dir, store) = temp_store();
        let mut gate = SessionGate::new(store.clone());
        gate.load().await;

        gate.set_token(Some("fresh".to_string())).await.unwrap();
        assert_eq!(gate.status(), SessionStatus::Authenticated);
        assert_eq!(store.load().await, Some("fresh".to_string()));

        gate.set_token(None).await.unwrap();
        assert_eq!(gate.status(), SessionStatus::Anonymous);
        assert_eq!(gate.token(), None);
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_empty_token_means_anonymous() {
        let (_dir, store) = temp_store();
        let mut gate = SessionGate::new(store);
        gate.load().await;
        gate.set_token(Some(String::new())).await.unwrap();
        assert_eq!(gate.status(), SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_routing_is_idempotent_and_exclusive() {
        let (_dir, store) = temp_store();
        let mut gate = SessionGate::new(store);

        // Unknown: no routing decision at all.
        assert_eq!(gate.route(ScreenGroup::Auth), None);
        assert_eq!(gate.route(ScreenGroup::Main), None);

        gate.load().await;
        // Anonymous: main screens redirect to auth, auth screens stay.
        assert_eq!(gate.route(ScreenGroup::Main), Some(ScreenGroup::Auth));
        assert_eq!(gate.route(ScreenGroup::Auth), None);

        let _ = gate.set_token(Some("tok".to_string()));
        // Authenticated: exactly the mirror image.
        assert_eq!(gate.route(ScreenGroup::Auth), Some(ScreenGroup::Main));
        assert_eq!(gate.route(ScreenGroup::Main), None);
    }
}
