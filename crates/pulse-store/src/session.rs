use parking_lot::RwLock;
use tracing::{info, warn};

use pulse_core::{Session, SessionRecord};

use crate::schema::keys;
use crate::storage::StorageRepo;

/// Holds the current user's session, persisted across restarts. Created on
/// login, cleared on logout; every other component only reads it.
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    repo: StorageRepo,
}

impl SessionStore {
    /// Build the store, rehydrating any persisted session.
    pub fn new(repo: StorageRepo) -> Self {
        let current = match repo.get(keys::SESSION) {
            Ok(Some(blob)) => match serde_json::from_str::<SessionRecord>(&blob) {
                Ok(rec) => Some(Session::from(rec)),
                Err(e) => {
                    warn!(error = %e, "corrupt session blob, discarding");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not read session blob");
                None
            }
        };

        Self {
            current: RwLock::new(current),
            repo,
        }
    }

    /// Install a session (login).
    pub fn set(&self, session: Session) {
        let rec = SessionRecord::from(&session);
        match serde_json::to_string(&rec) {
            Ok(blob) => {
                if let Err(e) = self.repo.put(keys::SESSION, &blob) {
                    warn!(error = %e, "session blob write failed");
                }
            }
            Err(e) => warn!(error = %e, "session serialization failed"),
        }
        info!(user_id = %session.user_id, "session installed");
        *self.current.write() = Some(session);
    }

    /// Drop the session (logout).
    pub fn clear(&self) {
        if let Err(e) = self.repo.delete(keys::SESSION) {
            warn!(error = %e, "session blob delete failed");
        }
        *self.current.write() = None;
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().as_ref().is_some_and(|s| s.is_authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::UserId;
    use secrecy::ExposeSecret;

    use crate::database::Database;

    #[test]
    fn starts_without_session() {
        let store = SessionStore::new(StorageRepo::new(Database::in_memory().unwrap()));
        assert!(store.current().is_none());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn set_then_current() {
        let store = SessionStore::new(StorageRepo::new(Database::in_memory().unwrap()));
        store.set(Session::new(UserId::new(9), "tok"));
        let session = store.current().unwrap();
        assert_eq!(session.user_id.as_i64(), 9);
        assert!(store.is_authenticated());
    }

    #[test]
    fn clear_drops_session() {
        let store = SessionStore::new(StorageRepo::new(Database::in_memory().unwrap()));
        store.set(Session::new(UserId::new(9), "tok"));
        store.clear();
        assert!(store.current().is_none());
    }

    #[test]
    fn session_survives_restart() {
        let db = Database::in_memory().unwrap();
        {
            let store = SessionStore::new(StorageRepo::new(db.clone()));
            store.set(Session::new(UserId::new(4), "persisted-tok"));
        }

        let restored = SessionStore::new(StorageRepo::new(db));
        let session = restored.current().unwrap();
        assert_eq!(session.user_id.as_i64(), 4);
        assert_eq!(session.token.expose_secret(), "persisted-tok");
    }

    #[test]
    fn cleared_session_stays_gone_after_restart() {
        let db = Database::in_memory().unwrap();
        {
            let store = SessionStore::new(StorageRepo::new(db.clone()));
            store.set(Session::new(UserId::new(4), "tok"));
            store.clear();
        }

        let restored = SessionStore::new(StorageRepo::new(db));
        assert!(restored.current().is_none());
    }
}
