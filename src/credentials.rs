//! Per-user session credentials and their on-disk store.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CREDENTIALS_FILE: &str = "credentials.json";

/// Credentials of one user session, as granted by the access token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub installation_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    /// Currently active user. The empty string is the anonymous user.
    #[serde(default)]
    active_user: String,
    #[serde(default)]
    sessions: HashMap<String, Session>,
}

/// Thread-safe store of session credentials, keyed by user id.
///
/// The empty string keys the anonymous session. With a storage directory the
/// store persists itself after every mutation; without one it is memory only.
/// Persistence is best effort, a failed write never fails the operation that
/// triggered it.
#[derive(Debug)]
pub struct CredentialStore {
    state: Mutex<StoreState>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(storage_dir: Option<&Path>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            path: storage_dir.map(|dir| dir.join(CREDENTIALS_FILE)),
        }
    }

    /// Replaces in-memory state with whatever the disk holds.
    ///
    /// A missing file leaves the store empty and a corrupt file resets it,
    /// so startup never fails on bad persisted state.
    pub fn load(&self) {
        let Some(path) = &self.path else { return };
        let state = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, "failed to parse credentials file, starting fresh");
                    StoreState::default()
                }
            },
            Err(_) => StoreState::default(),
        };
        *self.state.lock().unwrap() = state;
    }

    /// Session recorded for `user_id`, or an empty one.
    pub fn session(&self, user_id: &str) -> Session {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn access_token(&self, user_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(user_id)
            .and_then(|session| session.access_token.clone())
    }

    pub fn set_session(&self, user_id: &str, session: Session) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(user_id.to_string(), session);
        self.persist(&state);
    }

    /// Drops the access token for `user_id`, keeping the rest of the session
    /// so the installation identity survives token rotation.
    pub fn invalidate_access_token(&self, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.sessions.get_mut(user_id) {
            session.access_token = None;
        }
        self.persist(&state);
        debug!(user_id, "invalidated access token");
    }

    pub fn remove_session(&self, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.sessions.remove(user_id);
        self.persist(&state);
    }

    pub fn active_user(&self) -> String {
        self.state.lock().unwrap().active_user.clone()
    }

    /// Switches the active user and returns the previous one.
    pub fn set_active_user(&self, user_id: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let previous = std::mem::replace(&mut state.active_user, user_id.to_string());
        self.persist(&state);
        previous
    }

    /// Switches the active user for the lifetime of the returned guard; the
    /// previous active user is restored when the guard drops.
    pub fn swap_active_user(&self, user_id: &str) -> ActiveUserGuard<'_> {
        let previous = self.set_active_user(user_id);
        ActiveUserGuard {
            store: self,
            previous,
        }
    }

    fn persist(&self, state: &StoreState) -> bool {
        let Some(path) = &self.path else { return true };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(error = %e, "failed to create credentials directory");
                return false;
            }
        }
        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "failed to create credentials file");
                return false;
            }
        };
        let mut writer = BufWriter::new(file);
        if let Err(e) = serde_json::to_writer_pretty(&mut writer, state) {
            warn!(error = %e, "failed to write credentials file");
            return false;
        }
        if let Err(e) = writer.flush() {
            warn!(error = %e, "failed to flush credentials file");
            return false;
        }
        true
    }
}

/// Restores the previously active user on drop.
pub struct ActiveUserGuard<'a> {
    store: &'a CredentialStore,
    previous: String,
}

impl Drop for ActiveUserGuard<'_> {
    fn drop(&mut self) {
        self.store.set_active_user(&self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (CredentialStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(Some(dir.path()));
        (store, dir)
    }

    fn test_session(token: &str) -> Session {
        Session {
            access_token: Some(token.to_string()),
            session_id: Some("sid-1".to_string()),
            installation_id: Some("inst-1".to_string()),
            user_id: None,
        }
    }

    #[test]
    fn test_set_and_reload_session() {
        let (store, dir) = create_test_store();
        store.set_session("", test_session("tok-1"));

        let reloaded = CredentialStore::new(Some(dir.path()));
        reloaded.load();
        assert_eq!(reloaded.session(""), test_session("tok-1"));
        assert_eq!(reloaded.access_token(""), Some("tok-1".to_string()));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (store, _dir) = create_test_store();
        store.load();
        assert_eq!(store.session(""), Session::default());
        assert_eq!(store.active_user(), "");
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let (store, dir) = create_test_store();
        store.set_session("", test_session("tok-1"));
        fs::write(dir.path().join(CREDENTIALS_FILE), "not json{{").unwrap();

        let reloaded = CredentialStore::new(Some(dir.path()));
        reloaded.load();
        assert_eq!(reloaded.session(""), Session::default());
    }

    #[test]
    fn test_invalidate_keeps_installation_identity() {
        let (store, _dir) = create_test_store();
        store.set_session("u1", test_session("tok-1"));
        store.invalidate_access_token("u1");

        let session = store.session("u1");
        assert_eq!(session.access_token, None);
        assert_eq!(session.session_id, Some("sid-1".to_string()));
        assert_eq!(session.installation_id, Some("inst-1".to_string()));
    }

    #[test]
    fn test_active_user_persists() {
        let (store, dir) = create_test_store();
        store.set_active_user("u1");

        let reloaded = CredentialStore::new(Some(dir.path()));
        reloaded.load();
        assert_eq!(reloaded.active_user(), "u1");
    }

    #[test]
    fn test_swap_active_user_restores_on_drop() {
        let (store, _dir) = create_test_store();
        store.set_active_user("u1");
        {
            let _guard = store.swap_active_user("u2");
            assert_eq!(store.active_user(), "u2");
            {
                let _inner = store.swap_active_user("u3");
                assert_eq!(store.active_user(), "u3");
            }
            assert_eq!(store.active_user(), "u2");
        }
        assert_eq!(store.active_user(), "u1");
    }

    #[test]
    fn test_remove_session() {
        let (store, _dir) = create_test_store();
        store.set_session("u1", test_session("tok-1"));
        store.remove_session("u1");
        assert_eq!(store.session("u1"), Session::default());
    }

    #[test]
    fn test_memory_only_store() {
        let store = CredentialStore::new(None);
        store.load();
        store.set_session("", test_session("tok-1"));
        assert_eq!(store.access_token(""), Some("tok-1".to_string()));
    }
}
