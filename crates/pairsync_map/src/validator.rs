//! Post-pass integrity sweep over a freshly built map.

use crate::map::CorrelationMap;
use std::collections::HashSet;
use tracing::{info, warn};

/// Outcome of a validation sweep, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Entries remaining after repair.
    pub total: usize,
    /// Entries removed by repair.
    pub repaired: usize,
}

/// Validates and repairs a map before persistence.
///
/// Two classes of defect are repaired, both by removing the entry:
/// an entry missing either side (a remote call failed mid-pass and the
/// entry was deliberately left half-written), and an entry still
/// referencing a record id that an endpoint actually deleted during
/// the run (covers races between in-memory state and remote deletion).
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    /// Creates a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sweeps `map`, removing invalid entries, and reports counts.
    pub fn repair(
        &self,
        map: &mut CorrelationMap,
        deleted_left: &HashSet<String>,
        deleted_right: &HashSet<String>,
    ) -> RepairReport {
        let before = map.len();

        map.entries.retain(|sid, entry| {
            if !entry.is_complete() {
                warn!(%sid, key = %entry.key, "removing half-written entry");
                return false;
            }
            if let Some(left) = &entry.left {
                if deleted_left.contains(&left.id) {
                    warn!(%sid, key = %entry.key, id = %left.id,
                        "removing entry referencing a record deleted on the left");
                    return false;
                }
            }
            if let Some(right) = &entry.right {
                if deleted_right.contains(&right.id) {
                    warn!(%sid, key = %entry.key, id = %right.id,
                        "removing entry referencing a record deleted on the right");
                    return false;
                }
            }
            true
        });

        let report = RepairReport {
            total: map.len(),
            repaired: before - map.len(),
        };
        if report.repaired > 0 {
            info!(total = report.total, repaired = report.repaired, "map repaired");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CorrelationEntry, EntryEnd, Sid, Side};

    fn complete(key: &str, lid: &str, rid: &str) -> CorrelationEntry {
        CorrelationEntry::complete(key, EntryEnd::new(lid, 1), EntryEnd::new(rid, 1))
    }

    #[test]
    fn removes_half_written_entries() {
        let mut map = CorrelationMap::new();
        map.insert(Sid::from("s1"), complete("a", "L1", "R1"));
        map.insert(
            Sid::from("s2"),
            CorrelationEntry::half("b", Side::Left, EntryEnd::new("L2", 1)),
        );

        let report = Validator::new().repair(&mut map, &HashSet::new(), &HashSet::new());
        assert_eq!(report, RepairReport { total: 1, repaired: 1 });
        assert!(map.get(&Sid::from("s1")).is_some());
        assert!(map.get(&Sid::from("s2")).is_none());
    }

    #[test]
    fn removes_entries_referencing_deleted_ids() {
        let mut map = CorrelationMap::new();
        map.insert(Sid::from("s1"), complete("a", "L1", "R1"));
        map.insert(Sid::from("s2"), complete("b", "L2", "R2"));
        map.insert(Sid::from("s3"), complete("c", "L3", "R3"));

        let deleted_left: HashSet<String> = ["L2".to_string()].into();
        let deleted_right: HashSet<String> = ["R3".to_string()].into();

        let report = Validator::new().repair(&mut map, &deleted_left, &deleted_right);
        assert_eq!(report, RepairReport { total: 1, repaired: 2 });
        assert!(map.get(&Sid::from("s1")).is_some());
    }

    #[test]
    fn clean_map_is_untouched() {
        let mut map = CorrelationMap::new();
        map.insert(Sid::from("s1"), complete("a", "L1", "R1"));
        let before = map.clone();

        let report = Validator::new().repair(&mut map, &HashSet::new(), &HashSet::new());
        assert_eq!(report, RepairReport { total: 1, repaired: 0 });
        assert_eq!(map, before);
    }
}
