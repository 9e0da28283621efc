//! The reconciliation pass over one relation.

use crate::config::{RelationConfig, SyncMode};
use crate::endpoint::Endpoint;
use crate::error::{EngineError, EngineResult};
use crate::record::{Record, Snapshot};
use crate::run::{PassOutcome, RunState};
use crate::translate::{Translator, TranslatorRegistry};
use pairsync_map::{CorrelationEntry, CorrelationMap, EntryEnd, Sid, Side};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces a new, consistent correlation map from the previous one
/// plus two fresh endpoint snapshots.
///
/// The reconciler never mutates the previous map: each pass writes its
/// results into a freshly allocated map, and the caller replaces the
/// old one only after validation succeeds. Per-record remote failures
/// degrade the affected entry and never abort the pass; an error
/// escaping [`Reconciler::process`] aborts the pass entirely and no
/// map is persisted.
pub struct Reconciler {
    config: RelationConfig,
    left: Box<dyn Endpoint>,
    right: Box<dyn Endpoint>,
    to_right: Arc<dyn Translator>,
    to_left: Arc<dyn Translator>,
}

/// Logs a per-record failure and counts it against `side`.
fn record_failure(side: Side, sid: &Sid, key: &str, err: &EngineError, run: &mut RunState) {
    warn!(%sid, key, side = %side, error = %err, "remote call failed, entry degraded");
    run.counters_mut(side).record_errors += 1;
}

impl Reconciler {
    /// Creates a reconciler for one relation.
    ///
    /// Translators for both directions are resolved from `registry`
    /// once, here, keyed by the endpoints' kinds.
    pub fn new(
        config: RelationConfig,
        left: Box<dyn Endpoint>,
        right: Box<dyn Endpoint>,
        registry: &TranslatorRegistry,
    ) -> Self {
        let to_right = registry.resolve(left.kind(), right.kind());
        let to_left = registry.resolve(right.kind(), left.kind());
        Self {
            config,
            left,
            right,
            to_right,
            to_left,
        }
    }

    /// The relation configuration.
    #[must_use]
    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    /// Signature of one endpoint, for map stamping.
    #[must_use]
    pub fn signature(&self, side: Side) -> String {
        match side {
            Side::Left => self.left.signature(),
            Side::Right => self.right.signature(),
        }
    }

    fn endpoint_mut(&mut self, side: Side) -> &mut dyn Endpoint {
        match side {
            Side::Left => self.left.as_mut(),
            Side::Right => self.right.as_mut(),
        }
    }

    fn translator_to(&self, target: Side) -> Arc<dyn Translator> {
        match target {
            Side::Left => Arc::clone(&self.to_left),
            Side::Right => Arc::clone(&self.to_right),
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// `previous` is the last persisted map; `None` triggers initial
    /// sync. Returns the freshly built entries plus the run state the
    /// validator and commit hooks need.
    pub fn process(&mut self, previous: Option<&CorrelationMap>) -> EngineResult<PassOutcome> {
        let left_snap = self.left.snapshot(None)?;
        let right_snap = self.right.snapshot(None)?;
        info!(
            relation = %self.config.relation,
            mode = %self.config.mode,
            left = left_snap.len(),
            right = right_snap.len(),
            "pass started"
        );

        let mut run = RunState::new();
        let mut next = CorrelationMap::new();

        match previous {
            None => self.initial_sync(left_snap, right_snap, &mut next, &mut run),
            Some(prev) => self.incremental(prev, left_snap, right_snap, &mut next, &mut run),
        }

        info!(
            relation = %self.config.relation,
            entries = next.len(),
            errors = run.total_errors(),
            "pass completed"
        );
        Ok(PassOutcome { entries: next, run })
    }

    /// Invokes both endpoints' commit hooks, letting adapters reconcile
    /// staged temporary ids and release resources.
    pub fn commit(&mut self, run: &mut RunState) -> EngineResult<()> {
        self.left.commit_run(Side::Left, run)?;
        self.right.commit_run(Side::Right, run)?;
        Ok(())
    }

    /// Re-pushes the `source` side's live record over every correlated
    /// counterpart, regardless of the `changed` predicate.
    pub fn force_update(
        &mut self,
        previous: &CorrelationMap,
        source: Side,
    ) -> EngineResult<PassOutcome> {
        let target = source.opposite();
        let mut source_snap = self.endpoint_mut(source).snapshot(None)?;
        info!(
            relation = %self.config.relation,
            source = %source,
            entries = previous.len(),
            "forced one-sided update"
        );

        let mut run = RunState::new();
        let mut next = CorrelationMap::new();

        for (sid, prev_entry) in &previous.entries {
            let (Some(stored_source), Some(stored_target)) =
                (prev_entry.side(source), prev_entry.side(target))
            else {
                warn!(%sid, key = %prev_entry.key, "dropping incomplete entry from previous map");
                continue;
            };

            let Some(srec) = source_snap.take(&stored_source.id) else {
                warn!(%sid, key = %prev_entry.key, "source record missing, carrying entry forward");
                next.insert(sid.clone(), prev_entry.clone());
                continue;
            };

            let mut entry =
                CorrelationEntry::half(&srec.key, source, EntryEnd::new(&srec.id, srec.time));
            match self.push_to(target, &srec, &stored_target.id, sid, &mut run) {
                Ok(end) => *entry.side_mut(target) = Some(end),
                Err(err) => record_failure(target, sid, &prev_entry.key, &err, &mut run),
            }
            next.insert(sid.clone(), entry);
        }

        Ok(PassOutcome { entries: next, run })
    }

    /// Rebuilds the `source` side's opposite from scratch: every
    /// correlated counterpart is deleted and recreated from the source
    /// side's live record. Sids stay stable.
    pub fn reset_side(
        &mut self,
        previous: &CorrelationMap,
        source: Side,
    ) -> EngineResult<PassOutcome> {
        let target = source.opposite();
        let mut source_snap = self.endpoint_mut(source).snapshot(None)?;
        let mut target_snap = self.endpoint_mut(target).snapshot(None)?;
        info!(
            relation = %self.config.relation,
            source = %source,
            target = %target,
            "resetting one side from the other"
        );

        let mut run = RunState::new();
        let mut next = CorrelationMap::new();

        for (sid, prev_entry) in &previous.entries {
            if let Some(stored_target) = prev_entry.side(target) {
                target_snap.take(&stored_target.id);
                if let Err(err) = self.delete_on(target, &stored_target.id, sid, &mut run) {
                    record_failure(target, sid, &prev_entry.key, &err, &mut run);
                }
            }

            let Some(srec) = prev_entry
                .side(source)
                .and_then(|end| source_snap.take(&end.id))
            else {
                debug!(%sid, key = %prev_entry.key, "source record gone, dropping entry");
                continue;
            };

            let mut entry =
                CorrelationEntry::half(&srec.key, source, EntryEnd::new(&srec.id, srec.time));
            match self.create_on(target, &srec, sid, &mut run) {
                Ok(end) => *entry.side_mut(target) = Some(end),
                Err(err) => record_failure(target, sid, &srec.key, &err, &mut run),
            }
            next.insert(sid.clone(), entry);
        }

        // Uncorrelated source records get fresh counterparts, as in
        // initial sync.
        for srec in source_snap.into_records() {
            let sid = Sid::generate();
            let mut entry =
                CorrelationEntry::half(&srec.key, source, EntryEnd::new(&srec.id, srec.time));
            match self.create_on(target, &srec, &sid, &mut run) {
                Ok(end) => *entry.side_mut(target) = Some(end),
                Err(err) => record_failure(target, &sid, &srec.key, &err, &mut run),
            }
            next.insert(sid, entry);
        }

        // Untracked target records are only touched in strict mode, and
        // only when the right side is the one being rebuilt.
        if self.config.mode == SyncMode::UnidirectionalStrict && target == Side::Right {
            for trec in target_snap.into_records() {
                let sid = Sid::generate();
                info!(key = %trec.key, id = %trec.id, "deleting untracked right record (strict)");
                if let Err(err) = self.delete_on(target, &trec.id, &sid, &mut run) {
                    record_failure(target, &sid, &trec.key, &err, &mut run);
                }
            }
        }

        Ok(PassOutcome { entries: next, run })
    }

    fn initial_sync(
        &mut self,
        left_snap: Snapshot,
        mut right_snap: Snapshot,
        next: &mut CorrelationMap,
        run: &mut RunState,
    ) {
        info!(relation = %self.config.relation, "no previous map, running initial sync");

        for lrec in left_snap.into_records() {
            let sid = Sid::generate();
            let mut entry =
                CorrelationEntry::half(&lrec.key, Side::Left, EntryEnd::new(&lrec.id, lrec.time));
            match self.match_or_create_right(&lrec, &mut right_snap, &sid, run) {
                Ok(end) => *entry.side_mut(Side::Right) = Some(end),
                Err(err) => record_failure(Side::Right, &sid, &lrec.key, &err, run),
            }
            next.insert(sid, entry);
        }

        if self.config.mode.is_bidirectional() {
            for rrec in right_snap.into_records() {
                let sid = Sid::generate();
                let mut entry = CorrelationEntry::half(
                    &rrec.key,
                    Side::Right,
                    EntryEnd::new(&rrec.id, rrec.time),
                );
                match self.create_on(Side::Left, &rrec, &sid, run) {
                    Ok(end) => *entry.side_mut(Side::Left) = Some(end),
                    Err(err) => record_failure(Side::Left, &sid, &rrec.key, &err, run),
                }
                next.insert(sid, entry);
            }
        } else if !right_snap.is_empty() {
            info!(
                count = right_snap.len(),
                "leaving unmatched right records uncorrelated (unidirectional)"
            );
        }
    }

    fn incremental(
        &mut self,
        prev: &CorrelationMap,
        mut left_snap: Snapshot,
        mut right_snap: Snapshot,
        next: &mut CorrelationMap,
        run: &mut RunState,
    ) {
        for (sid, prev_entry) in &prev.entries {
            let (Some(stored_left), Some(stored_right)) =
                (prev_entry.left.as_ref(), prev_entry.right.as_ref())
            else {
                warn!(%sid, key = %prev_entry.key, "dropping incomplete entry from previous map");
                continue;
            };

            let lrec = left_snap.take(&stored_left.id);
            let rrec = right_snap.take(&stored_right.id);

            match (lrec, rrec) {
                (None, None) => {
                    debug!(%sid, key = %prev_entry.key, "record gone on both sides, dropping entry");
                }
                (None, Some(rrec)) => {
                    // Left is authoritative for deletions in every mode.
                    info!(%sid, key = %prev_entry.key, "deleted on the left, deleting right counterpart");
                    if let Err(err) = self.delete_on(Side::Right, &rrec.id, sid, run) {
                        record_failure(Side::Right, sid, &prev_entry.key, &err, run);
                    }
                }
                (Some(lrec), None) => {
                    if self.config.mode.is_bidirectional() {
                        info!(%sid, key = %prev_entry.key, "deleted on the right, deleting left counterpart");
                        if let Err(err) = self.delete_on(Side::Left, &lrec.id, sid, run) {
                            record_failure(Side::Left, sid, &prev_entry.key, &err, run);
                        }
                    } else {
                        debug!(%sid, key = %prev_entry.key,
                            "right record gone, dropping entry without touching the left (unidirectional)");
                    }
                }
                (Some(lrec), Some(rrec)) => {
                    let entry =
                        self.reconcile_pair(sid, stored_left, stored_right, &lrec, &rrec, run);
                    next.insert(sid.clone(), entry);
                }
            }
        }

        for lrec in left_snap.into_records() {
            let sid = Sid::generate();
            info!(%sid, key = %lrec.key, "new record on the left");
            let mut entry =
                CorrelationEntry::half(&lrec.key, Side::Left, EntryEnd::new(&lrec.id, lrec.time));
            match self.create_on(Side::Right, &lrec, &sid, run) {
                Ok(end) => *entry.side_mut(Side::Right) = Some(end),
                Err(err) => record_failure(Side::Right, &sid, &lrec.key, &err, run),
            }
            next.insert(sid, entry);
        }

        for rrec in right_snap.into_records() {
            match self.config.mode {
                SyncMode::Bidirectional => {
                    let sid = Sid::generate();
                    info!(%sid, key = %rrec.key, "new record on the right");
                    let mut entry = CorrelationEntry::half(
                        &rrec.key,
                        Side::Right,
                        EntryEnd::new(&rrec.id, rrec.time),
                    );
                    match self.create_on(Side::Left, &rrec, &sid, run) {
                        Ok(end) => *entry.side_mut(Side::Left) = Some(end),
                        Err(err) => record_failure(Side::Left, &sid, &rrec.key, &err, run),
                    }
                    next.insert(sid, entry);
                }
                SyncMode::UnidirectionalStrict => {
                    let sid = Sid::generate();
                    info!(key = %rrec.key, id = %rrec.id,
                        "deleting untracked right record (unidirectional-strict)");
                    if let Err(err) = self.delete_on(Side::Right, &rrec.id, &sid, run) {
                        record_failure(Side::Right, &sid, &rrec.key, &err, run);
                    }
                }
                SyncMode::Unidirectional => {
                    debug!(key = %rrec.key, id = %rrec.id,
                        "leaving untracked right record alone (unidirectional)");
                }
            }
        }
    }

    /// Resolves one entry whose records exist on both sides.
    fn reconcile_pair(
        &mut self,
        sid: &Sid,
        stored_left: &EntryEnd,
        stored_right: &EntryEnd,
        lrec: &Record,
        rrec: &Record,
        run: &mut RunState,
    ) -> CorrelationEntry {
        let left_changed = self.left.changed(stored_left, lrec);
        let right_changed = self.right.changed(stored_right, rrec);

        let mut entry = CorrelationEntry::complete(
            &lrec.key,
            EntryEnd::new(&lrec.id, lrec.time),
            EntryEnd::new(&rrec.id, rrec.time),
        );

        if !left_changed && !right_changed {
            debug!(%sid, key = %lrec.key, "unchanged, carrying entry forward");
            return entry;
        }

        let (source_side, reason) = if left_changed && right_changed {
            // Conflict: the strictly later modification time wins.
            // Exact ties go to the left endpoint.
            if rrec.time > lrec.time {
                (Side::Right, "conflict, right is newer")
            } else {
                (Side::Left, "conflict, left is newer or tied")
            }
        } else if left_changed {
            (Side::Left, "changed on the left")
        } else if self.config.mode.is_bidirectional() {
            (Side::Right, "changed on the right")
        } else {
            // Drift correction: the right's independent change is
            // overwritten with the left's current state.
            (Side::Left, "right drift overwritten (unidirectional)")
        };

        let (source, target_id, target) = match source_side {
            Side::Left => (lrec, rrec.id.as_str(), Side::Right),
            Side::Right => (rrec, lrec.id.as_str(), Side::Left),
        };

        info!(%sid, key = %lrec.key, source = %source_side, reason, "propagating update");
        match self.push_to(target, source, target_id, sid, run) {
            Ok(end) => *entry.side_mut(target) = Some(end),
            Err(err) => {
                record_failure(target, sid, &lrec.key, &err, run);
                *entry.side_mut(target) = None;
            }
        }
        entry
    }

    /// During initial sync: match a left record to an existing right
    /// record by exact key, or create the missing counterpart.
    fn match_or_create_right(
        &mut self,
        lrec: &Record,
        right_snap: &mut Snapshot,
        sid: &Sid,
        run: &mut RunState,
    ) -> EngineResult<EntryEnd> {
        if let Some(rid) = self.right.find_by_key(&lrec.key)? {
            if let Some(rrec) = right_snap.take(&rid) {
                info!(%sid, key = %lrec.key, id = %rrec.id, "matched existing right record by key");
                return Ok(EntryEnd::new(rrec.id, rrec.time));
            }
        }
        self.create_on(Side::Right, lrec, sid, run)
    }

    fn create_on(
        &mut self,
        target: Side,
        source: &Record,
        sid: &Sid,
        run: &mut RunState,
    ) -> EngineResult<EntryEnd> {
        let translator = self.translator_to(target);
        let payload = translator.translate(source, None)?;
        let created = self.endpoint_mut(target).create(&payload, sid)?;
        run.counters_mut(target).creates += 1;
        info!(%sid, key = %source.key, target = %target, id = %created.id, "created counterpart");
        Ok(EntryEnd::new(created.id, created.time))
    }

    fn push_to(
        &mut self,
        target: Side,
        source: &Record,
        target_id: &str,
        sid: &Sid,
        run: &mut RunState,
    ) -> EngineResult<EntryEnd> {
        let translator = self.translator_to(target);
        let endpoint = self.endpoint_mut(target);
        let existing = match endpoint.get(target_id) {
            Ok(record) => Some(record),
            Err(EngineError::NotFound { .. }) => None,
            Err(err) => return Err(err),
        };
        let payload = translator.translate(source, existing.as_ref())?;
        let updated = endpoint.update(&payload, target_id, sid)?;
        run.counters_mut(target).updates += 1;
        Ok(EntryEnd::new(updated.id, updated.time))
    }

    fn delete_on(
        &mut self,
        target: Side,
        id: &str,
        sid: &Sid,
        run: &mut RunState,
    ) -> EngineResult<()> {
        self.endpoint_mut(target).delete(id, sid)?;
        run.counters_mut(target).deletes += 1;
        run.record_delete(target, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEndpoint;

    fn reconciler(left: MemoryEndpoint, right: MemoryEndpoint) -> Reconciler {
        Reconciler::new(
            RelationConfig::new("r1"),
            Box::new(left),
            Box::new(right),
            &TranslatorRegistry::new(),
        )
    }

    #[test]
    fn empty_endpoints_produce_empty_map() {
        let mut engine = reconciler(MemoryEndpoint::new("l"), MemoryEndpoint::new("r"));
        let outcome = engine.process(None).unwrap();
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.run.total_errors(), 0);
    }

    #[test]
    fn initial_sync_matches_by_exact_key() {
        let left = MemoryEndpoint::new("l").with_record(Record::new("L1", "Buy milk", 100));
        let right = MemoryEndpoint::new("r").with_record(Record::new("R9", "Buy milk", 90));

        let mut engine = reconciler(left, right);
        let outcome = engine.process(None).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        let entry = outcome.entries.entries.values().next().unwrap();
        assert_eq!(entry.left.as_ref().unwrap().id, "L1");
        assert_eq!(entry.right.as_ref().unwrap().id, "R9");
        assert_eq!(outcome.run.right.creates, 0);
    }

    #[test]
    fn signatures_come_from_endpoints() {
        let engine = reconciler(MemoryEndpoint::new("l"), MemoryEndpoint::new("r"));
        assert_eq!(engine.signature(Side::Left), "memory:l");
        assert_eq!(engine.signature(Side::Right), "memory:r");
    }
}
