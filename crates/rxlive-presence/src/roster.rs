//! The live online-user set for one connection epoch.

use rxlive_protocol::{PresenceEntry, PresenceEvent, UserId};

/// Users currently online at an outlet, in arrival order.
///
/// Holds at most one entry per [`UserId`]. The server is the authority:
/// the set only changes through [`apply`](Self::apply) and never infers
/// membership on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineSet {
    entries: Vec<PresenceEntry>,
}

impl OnlineSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one server event into the set.
    ///
    /// - `join` adds the entry, or replaces the one with the same user id
    ///   in place.
    /// - `leave` removes by user id.
    /// - `roster` replaces the whole set. Duplicate ids inside a roster
    ///   collapse to the last one listed.
    /// - unknown events are ignored.
    ///
    /// Returns `true` if the set changed.
    pub fn apply(&mut self, event: PresenceEvent) -> bool {
        match event {
            PresenceEvent::Join(entry) => self.upsert(entry),
            PresenceEvent::Leave { user_id } => self.remove(&user_id),
            PresenceEvent::Roster { entries } => {
                let mut next = OnlineSet::new();
                for entry in entries {
                    next.upsert(entry);
                }
                let changed = next != *self;
                *self = next;
                changed
            }
            PresenceEvent::Unknown => false,
        }
    }

    /// Empties the set. Returns `true` if it held anything.
    pub fn clear(&mut self) -> bool {
        let changed = !self.entries.is_empty();
        self.entries.clear();
        changed
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.position(user_id).is_some()
    }

    pub fn entries(&self) -> &[PresenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn upsert(&mut self, entry: PresenceEntry) -> bool {
        match self.position(&entry.user_id) {
            Some(i) if self.entries[i] == entry => false,
            Some(i) => {
                self.entries[i] = entry;
                true
            }
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    fn remove(&mut self, user_id: &UserId) -> bool {
        match self.position(user_id) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    fn position(&self, user_id: &UserId) -> Option<usize> {
        self.entries.iter().position(|e| &e.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(id: &str, role: &str) -> PresenceEvent {
        PresenceEvent::Join(PresenceEntry::new(id, role))
    }

    fn leave(id: &str) -> PresenceEvent {
        PresenceEvent::Leave {
            user_id: UserId::new(id),
        }
    }

    fn roster(ids: &[&str]) -> PresenceEvent {
        PresenceEvent::Roster {
            entries: ids.iter().map(|id| PresenceEntry::new(*id, "staff")).collect(),
        }
    }

    fn ids(set: &OnlineSet) -> Vec<&str> {
        set.entries().iter().map(|e| e.user_id.as_str()).collect()
    }

    #[test]
    fn test_join_join_leave_leaves_second_user() {
        let mut set = OnlineSet::new();
        set.apply(join("A", "cashier"));
        set.apply(join("B", "pharmacist"));
        set.apply(leave("A"));
        assert_eq!(ids(&set), vec!["B"]);
    }

    #[test]
    fn test_join_upserts_in_place() {
        let mut set = OnlineSet::new();
        set.apply(join("A", "cashier"));
        set.apply(join("B", "cashier"));
        assert!(set.apply(join("A", "manager")));
        assert_eq!(ids(&set), vec!["A", "B"]);
        assert_eq!(set.entries()[0].role, "manager");

        assert!(!set.apply(join("A", "manager")), "identical join is a no-op");
    }

    #[test]
    fn test_roster_replaces_prior_history() {
        let mut set = OnlineSet::new();
        set.apply(join("A", "cashier"));
        set.apply(join("B", "cashier"));
        set.apply(leave("B"));
        set.apply(join("E", "cashier"));

        assert!(set.apply(roster(&["C", "D"])));
        assert_eq!(ids(&set), vec!["C", "D"]);
    }

    #[test]
    fn test_roster_collapses_duplicates() {
        let mut set = OnlineSet::new();
        set.apply(PresenceEvent::Roster {
            entries: vec![
                PresenceEntry::new("C", "old"),
                PresenceEntry::new("D", "staff"),
                PresenceEntry::new("C", "new"),
            ],
        });
        assert_eq!(ids(&set), vec!["C", "D"]);
        assert_eq!(set.entries()[0].role, "new");
    }

    #[test]
    fn test_noop_events_report_unchanged() {
        let mut set = OnlineSet::new();
        assert!(!set.apply(leave("ghost")));
        assert!(!set.apply(PresenceEvent::Unknown));
        assert!(!set.apply(roster(&[])));

        set.apply(roster(&["C"]));
        assert!(!set.apply(roster(&["C"])));
    }

    #[test]
    fn test_clear() {
        let mut set = OnlineSet::new();
        assert!(!set.clear());
        set.apply(join("A", "cashier"));
        assert!(set.contains(&UserId::new("A")));
        assert!(set.clear());
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }
}
