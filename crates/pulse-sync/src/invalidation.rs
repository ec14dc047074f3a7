use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

/// Statically-declared dependent cache keys: a subject always invalidates
/// its own key plus the entries here. Milestones are rendered as a function
/// of project state, so a `projects` update also stales `milestones`.
const DEPENDENTS: &[(&str, &[&str])] = &[("projects", &["milestones"])];

/// The cache keys a `dataUpdate` subject invalidates. An empty subject tag
/// is a no-op.
pub fn keys_to_invalidate(subject_type: &str) -> Vec<String> {
    if subject_type.is_empty() {
        return Vec::new();
    }
    let mut keys = vec![subject_type.to_owned()];
    if let Some((_, deps)) = DEPENDENTS.iter().find(|(s, _)| *s == subject_type) {
        keys.extend(deps.iter().map(|d| (*d).to_owned()));
    }
    keys
}

/// The external keyed cache of server-derived data, consumed as a
/// capability: all this subsystem can do to it is invalidate keys.
pub trait QueryCache: Send + Sync {
    fn invalidate(&self, key: &str);
}

/// Default [`QueryCache`] capability: records when each key went stale so
/// consumers can re-fetch before their next read.
#[derive(Default)]
pub struct StaleMarker {
    stale: DashMap<String, DateTime<Utc>>,
}

impl StaleMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.stale.contains_key(key)
    }

    /// Take all stale keys, clearing them.
    pub fn drain(&self) -> Vec<String> {
        let keys: Vec<String> = self.stale.iter().map(|e| e.key().clone()).collect();
        for key in &keys {
            self.stale.remove(key);
        }
        keys
    }
}

impl QueryCache for StaleMarker {
    fn invalidate(&self, key: &str) {
        debug!(key, "query cache key invalidated");
        self.stale.insert(key.to_owned(), Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_invalidates_its_own_key() {
        assert_eq!(keys_to_invalidate("tasks"), vec!["tasks"]);
    }

    #[test]
    fn projects_also_invalidates_milestones() {
        assert_eq!(keys_to_invalidate("projects"), vec!["projects", "milestones"]);
    }

    #[test]
    fn empty_subject_is_noop() {
        assert!(keys_to_invalidate("").is_empty());
    }

    #[test]
    fn stale_marker_records_and_drains() {
        let cache = StaleMarker::new();
        cache.invalidate("projects");
        cache.invalidate("milestones");
        assert!(cache.is_stale("projects"));
        assert!(!cache.is_stale("tasks"));

        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec!["milestones", "projects"]);
        assert!(!cache.is_stale("projects"));
    }
}
