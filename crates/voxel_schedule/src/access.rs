//! Tracking of component accesses held by running tasks.

use std::collections::{HashMap, HashSet};

use voxel_ecs::ComponentTypeId;

use crate::task::AccessSet;

/// A multiset of read accesses and a set of write accesses currently held by
/// running tasks.
#[derive(Debug, Default)]
pub struct AccessTracker {
    reads: HashMap<ComponentTypeId, usize>,
    writes: HashSet<ComponentTypeId>,
}

impl AccessTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if starting a task with the given access set would
    /// violate exclusion: the task writes something currently read or
    /// written, or reads something currently written.
    #[must_use]
    pub fn has_access_conflict(&self, access: &AccessSet) -> bool {
        access
            .writes
            .iter()
            .any(|w| self.writes.contains(w) || self.reads.contains_key(w))
            || access.reads.iter().any(|r| self.writes.contains(r))
    }

    /// Marks a task's accesses as held.
    pub fn add_task_access(&mut self, access: &AccessSet) {
        for &r in &access.reads {
            *self.reads.entry(r).or_insert(0) += 1;
        }
        for &w in &access.writes {
            let inserted = self.writes.insert(w);
            debug_assert!(inserted, "write access already held");
        }
    }

    /// Releases a task's accesses.
    pub fn remove_task_access(&mut self, access: &AccessSet) {
        for r in &access.reads {
            if let Some(count) = self.reads.get_mut(r) {
                *count -= 1;
                if *count == 0 {
                    self.reads.remove(r);
                }
            }
        }
        for w in &access.writes {
            self.writes.remove(w);
        }
    }

    /// Returns `true` if any access is currently held.
    #[must_use]
    pub fn has_ongoing_access(&self) -> bool {
        !self.reads.is_empty() || !self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ComponentTypeId {
        ComponentTypeId::from_name(name)
    }

    #[test]
    fn test_readers_share_access() {
        let mut tracker = AccessTracker::new();
        let read = AccessSet::new().read(id("a"));
        tracker.add_task_access(&read);
        assert!(!tracker.has_access_conflict(&read));
        tracker.add_task_access(&read);

        // A writer is blocked until both readers release.
        let write = AccessSet::new().write(id("a"));
        assert!(tracker.has_access_conflict(&write));
        tracker.remove_task_access(&read);
        assert!(tracker.has_access_conflict(&write));
        tracker.remove_task_access(&read);
        assert!(!tracker.has_access_conflict(&write));
        assert!(!tracker.has_ongoing_access());
    }

    #[test]
    fn test_writer_excludes_everyone() {
        let mut tracker = AccessTracker::new();
        let write = AccessSet::new().write(id("a"));
        tracker.add_task_access(&write);

        assert!(tracker.has_access_conflict(&AccessSet::new().read(id("a"))));
        assert!(tracker.has_access_conflict(&AccessSet::new().write(id("a"))));
        assert!(!tracker.has_access_conflict(&AccessSet::new().write(id("b"))));

        tracker.remove_task_access(&write);
        assert!(!tracker.has_ongoing_access());
    }
}
