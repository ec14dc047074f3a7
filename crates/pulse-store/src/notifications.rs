use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pulse_core::{Notification, NotificationId};

use crate::schema::keys;
use crate::storage::StorageRepo;

/// Process-wide notification state: the ordered list (newest first) and the
/// derived unread counter, persisted wholesale as one blob and rehydrated at
/// construction.
///
/// Persistence failures are logged and the in-memory state stays
/// authoritative until the next successful write.
pub struct NotificationStore {
    state: RwLock<State>,
    repo: StorageRepo,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct State {
    notifications: Vec<Notification>,
    unread_count: u32,
}

impl NotificationStore {
    /// Build the store, rehydrating from the persisted blob if one exists.
    /// A corrupt blob is logged and discarded; the store starts empty.
    pub fn new(repo: StorageRepo) -> Self {
        let state = match repo.get(keys::NOTIFICATIONS) {
            Ok(Some(blob)) => match serde_json::from_str::<State>(&blob) {
                Ok(state) => {
                    debug!(count = state.notifications.len(), unread = state.unread_count, "notification store rehydrated");
                    state
                }
                Err(e) => {
                    warn!(error = %e, "corrupt notification blob, starting empty");
                    State::default()
                }
            },
            Ok(None) => State::default(),
            Err(e) => {
                warn!(error = %e, "could not read notification blob, starting empty");
                State::default()
            }
        };

        Self {
            state: RwLock::new(state),
            repo,
        }
    }

    /// Replace the list wholesale. Unread count becomes the number of
    /// entries with `read == false`. Any realtime notifications not yet
    /// persisted server-side are dropped by the replace.
    pub fn set_all(&self, list: Vec<Notification>) {
        let mut state = self.state.write();
        state.unread_count = list.iter().filter(|n| !n.read).count() as u32;
        state.notifications = list;
        let snapshot = state.clone();
        drop(state);
        self.persist(&snapshot);
    }

    /// Prepend one notification. The unread counter goes up by exactly one
    /// regardless of the item's `read` flag (current behavior, kept).
    pub fn add_one(&self, notification: Notification) {
        let mut state = self.state.write();
        state.notifications.insert(0, notification);
        state.unread_count += 1;
        let snapshot = state.clone();
        drop(state);
        self.persist(&snapshot);
    }

    /// Mark a single notification read. Local-only mutation; the counter is
    /// decremented once per matching entry, floored at zero.
    pub fn mark_read(&self, id: &NotificationId) {
        let mut state = self.state.write();
        let Some(entry) = state.notifications.iter_mut().find(|n| &n.id == id) else {
            return;
        };
        entry.read = true;
        state.unread_count = state.unread_count.saturating_sub(1);
        let snapshot = state.clone();
        drop(state);
        self.persist(&snapshot);
    }

    /// The local half of mark-all-read: flips every entry and zeroes the
    /// counter. Callers apply this only after the server call succeeded.
    pub fn apply_all_read(&self) {
        let mut state = self.state.write();
        for n in &mut state.notifications {
            n.read = true;
        }
        state.unread_count = 0;
        let snapshot = state.clone();
        drop(state);
        self.persist(&snapshot);
    }

    /// Empty the list and reset the counter. Logout/teardown only.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = State::default();
        let snapshot = state.clone();
        drop(state);
        self.persist(&snapshot);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.read().notifications.clone()
    }

    pub fn unread_count(&self) -> u32 {
        self.state.read().unread_count
    }

    pub fn len(&self) -> usize {
        self.state.read().notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().notifications.is_empty()
    }

    fn persist(&self, state: &State) {
        let blob = match serde_json::to_string(state) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "notification blob serialization failed");
                return;
            }
        };
        if let Err(e) = self.repo.put(keys::NOTIFICATIONS, &blob) {
            warn!(error = %e, "notification blob write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::Severity;

    use crate::database::Database;

    fn store() -> NotificationStore {
        NotificationStore::new(StorageRepo::new(Database::in_memory().unwrap()))
    }

    fn notification(id: &str, read: bool) -> Notification {
        Notification {
            id: NotificationId::from_raw(id),
            user_id: None,
            message: format!("n-{id}"),
            severity: Severity::Info,
            read,
            related_entity_id: None,
            payload: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn set_all_counts_unread() {
        let store = store();
        store.set_all(vec![
            notification("1", false),
            notification("2", true),
            notification("3", false),
        ]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn fetch_scenario_two_entries_one_unread() {
        let store = store();
        store.set_all(vec![notification("1", false), notification("2", true)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn add_one_prepends() {
        let store = store();
        store.set_all(vec![notification("old", false)]);
        store.add_one(notification("new", false));
        assert_eq!(store.notifications()[0].id.as_str(), "new");
    }

    #[test]
    fn add_one_increments_regardless_of_read_flag() {
        let store = store();
        store.add_one(notification("a", true));
        assert_eq!(store.unread_count(), 1);
        store.add_one(notification("b", false));
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn duplicate_ids_are_both_retained() {
        // Fallback ids can collide inside one millisecond; no dedup happens.
        let store = store();
        store.add_one(notification("1717243200000", false));
        store.add_one(notification("1717243200000", false));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn mark_read_decrements_floored_at_zero() {
        let store = store();
        store.set_all(vec![notification("1", false)]);
        store.mark_read(&NotificationId::from_raw("1"));
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications()[0].read);

        // Marking again must not underflow.
        store.mark_read(&NotificationId::from_raw("1"));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn mark_read_unknown_id_is_noop() {
        let store = store();
        store.set_all(vec![notification("1", false)]);
        store.mark_read(&NotificationId::from_raw("missing"));
        assert_eq!(store.unread_count(), 1);
        assert!(!store.notifications()[0].read);
    }

    #[test]
    fn apply_all_read_flips_everything() {
        let store = store();
        store.set_all(vec![notification("1", false), notification("2", false)]);
        store.apply_all_read();
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().iter().all(|n| n.read));
    }

    #[test]
    fn clear_empties_list_and_counter() {
        let store = store();
        store.set_all(vec![notification("1", false)]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn rehydrates_from_persisted_blob() {
        let db = Database::in_memory().unwrap();
        {
            let store = NotificationStore::new(StorageRepo::new(db.clone()));
            store.set_all(vec![notification("1", false), notification("2", true)]);
        }

        let restored = NotificationStore::new(StorageRepo::new(db));
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.unread_count(), 1);
    }

    #[test]
    fn corrupt_blob_starts_empty() {
        let db = Database::in_memory().unwrap();
        let repo = StorageRepo::new(db.clone());
        repo.put(keys::NOTIFICATIONS, "{definitely not json").unwrap();

        let store = NotificationStore::new(StorageRepo::new(db));
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
    }
}
