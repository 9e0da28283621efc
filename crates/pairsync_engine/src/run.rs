//! Per-run state: counters, deleted-id tracking, and id fixups.

use pairsync_map::{CorrelationMap, Sid, Side};
use std::collections::HashSet;
use tracing::debug;

/// Remote-call counters for one endpoint over one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideCounters {
    /// Records created on this endpoint.
    pub creates: u64,
    /// Records updated on this endpoint.
    pub updates: u64,
    /// Records deleted on this endpoint.
    pub deletes: u64,
    /// Per-record remote failures on this endpoint.
    pub record_errors: u64,
}

/// A staged id correction from an endpoint's commit hook.
///
/// Adapters that hand out local temporary ids during `create` push one
/// fixup per staged id; the driver applies them to the produced map
/// before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdFixup {
    /// Which side of the entry to correct.
    pub side: Side,
    /// Entry to correct.
    pub sid: Sid,
    /// Authoritative id.
    pub id: String,
    /// Authoritative modification time.
    pub time: i64,
}

/// Mutable state threaded through one pass and its commit hooks.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Counters for the left endpoint.
    pub left: SideCounters,
    /// Counters for the right endpoint.
    pub right: SideCounters,
    deleted_left: HashSet<String>,
    deleted_right: HashSet<String>,
    fixups: Vec<IdFixup>,
}

impl RunState {
    /// Creates an empty run state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for one side.
    #[must_use]
    pub fn counters(&self, side: Side) -> &SideCounters {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Mutable counters for one side.
    pub fn counters_mut(&mut self, side: Side) -> &mut SideCounters {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Records that `id` was actually deleted on `side` this run.
    pub fn record_delete(&mut self, side: Side, id: impl Into<String>) {
        let set = match side {
            Side::Left => &mut self.deleted_left,
            Side::Right => &mut self.deleted_right,
        };
        set.insert(id.into());
    }

    /// The ids deleted on `side` this run, for the validator's
    /// cross-reference.
    #[must_use]
    pub fn deleted(&self, side: Side) -> &HashSet<String> {
        match side {
            Side::Left => &self.deleted_left,
            Side::Right => &self.deleted_right,
        }
    }

    /// Stages an id fixup from a commit hook.
    pub fn push_fixup(&mut self, fixup: IdFixup) {
        self.fixups.push(fixup);
    }

    /// Staged fixups.
    #[must_use]
    pub fn fixups(&self) -> &[IdFixup] {
        &self.fixups
    }

    /// Applies staged fixups to `map`, rewriting the affected sides.
    pub fn apply_fixups(&self, map: &mut CorrelationMap) {
        for fixup in &self.fixups {
            if let Some(entry) = map.entries.get_mut(&fixup.sid) {
                if let Some(end) = entry.side_mut(fixup.side).as_mut() {
                    debug!(sid = %fixup.sid, side = %fixup.side,
                        from = %end.id, to = %fixup.id, "applying id fixup");
                    end.id = fixup.id.clone();
                    end.time = fixup.time;
                }
            }
        }
    }

    /// Total per-record failures across both sides.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.left.record_errors + self.right.record_errors
    }
}

/// The product of one engine pass: the freshly built entry map plus
/// the run state that built it.
#[derive(Debug)]
pub struct PassOutcome {
    /// New correlation entries (not yet stamped or validated).
    pub entries: CorrelationMap,
    /// Counters, deleted ids, and staged fixups.
    pub run: RunState,
}
