//! The per-relation run sequence shared by the sync-family commands.

use crate::config::RelationSpec;
use chrono::Utc;
use pairsync_engine::{
    CorrelationMap, EngineError, EngineResult, Reconciler, RelationConfig, Side,
    TranslatorRegistry,
};
use pairsync_map::{MapError, MapStore, Validator};
use std::error::Error;
use tracing::{error, info, warn};

/// What to do with one relation.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A regular reconciliation pass; `rebuild` discards the map first.
    Sync {
        /// Delete the map and re-run initial sync.
        rebuild: bool,
    },
    /// Re-push every correlated record from `source`, ignoring change
    /// detection.
    ForceUpdate {
        /// Side whose live records are pushed.
        source: Side,
    },
    /// Delete and recreate the side opposite `source`.
    Reset {
        /// Side whose live records are the template.
        source: Side,
    },
}

/// Result of driving one relation.
#[derive(Debug)]
pub enum RelationOutcome {
    /// The pass ran and the map was persisted.
    Completed {
        /// Entries in the persisted map.
        entries: usize,
        /// Entries removed by the validator.
        repaired: usize,
    },
    /// Another run holds the lock; nothing was done.
    SkippedLocked,
}

/// Drives one relation through the full run sequence: open endpoints,
/// load the previous map, lock, run the pass, validate, persist, unlock.
///
/// A failure after the lock is taken leaves the relation locked; the
/// marker holds the pre-run map bytes, so `unlock --rollback` restores
/// the last good state.
pub fn run_relation(spec: &RelationSpec, op: Operation) -> Result<RelationOutcome, Box<dyn Error>> {
    // Endpoint construction failures surface before the lock is touched.
    let left = spec.left.open()?;
    let right = spec.right.open()?;
    let registry = TranslatorRegistry::new();
    let mut engine = Reconciler::new(
        RelationConfig::new(&spec.name).with_mode(spec.mode),
        left,
        right,
        &registry,
    );

    let store = MapStore::new(&spec.map);
    if let Operation::Sync { rebuild: true } = op {
        store.remove()?;
    }
    let previous = store.load()?;
    if !matches!(op, Operation::Sync { .. }) && previous.is_none() {
        return Err(format!("relation '{}' has no map yet, run sync first", spec.name).into());
    }

    let guard = match store.lock(&spec.name) {
        Ok(guard) => guard,
        Err(MapError::Locked { relation, marker }) => {
            warn!(relation, marker, "relation is locked, skipping");
            return Ok(RelationOutcome::SkippedLocked);
        }
        Err(err) => return Err(err.into()),
    };

    let (map, repaired) = match execute(&mut engine, op, previous.as_ref()) {
        Ok(result) => result,
        Err(err) => {
            error!(relation = %spec.name, error = %err, "pass failed, relation left locked");
            guard.keep_locked();
            return Err(err.into());
        }
    };
    let entries = map.len();
    if let Err(err) = store.save(&map) {
        error!(relation = %spec.name, error = %err, "persist failed, relation left locked");
        guard.keep_locked();
        return Err(err.into());
    }
    guard.unlock()?;
    info!(relation = %spec.name, entries, repaired, "relation reconciled");
    Ok(RelationOutcome::Completed { entries, repaired })
}

/// Runs the pass itself and produces the stamped, validated map.
fn execute(
    engine: &mut Reconciler,
    op: Operation,
    previous: Option<&CorrelationMap>,
) -> EngineResult<(CorrelationMap, usize)> {
    let mut outcome = match (op, previous) {
        (Operation::Sync { .. }, prev) => engine.process(prev)?,
        (Operation::ForceUpdate { source }, Some(prev)) => engine.force_update(prev, source)?,
        (Operation::Reset { source }, Some(prev)) => engine.reset_side(prev, source)?,
        (_, None) => {
            return Err(EngineError::init(
                "map-derived operation invoked without a previous map",
            ))
        }
    };
    engine.commit(&mut outcome.run)?;

    let mut map = outcome.entries;
    outcome.run.apply_fixups(&mut map);
    let report = Validator::new().repair(
        &mut map,
        outcome.run.deleted(Side::Left),
        outcome.run.deleted(Side::Right),
    );
    map.stamp(
        engine.config().relation.clone(),
        engine.signature(Side::Left),
        engine.signature(Side::Right),
        Utc::now().to_rfc3339(),
    );
    Ok((map, report.repaired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointSpec;
    use pairsync_engine::SyncMode;
    use std::fs;
    use tempfile::tempdir;

    fn spec(dir: &std::path::Path, mode: SyncMode) -> RelationSpec {
        RelationSpec {
            name: "notes".into(),
            map: dir.join("notes.map.json"),
            mode,
            left: EndpointSpec::Fs {
                path: dir.join("left.json"),
            },
            right: EndpointSpec::Fs {
                path: dir.join("right.json"),
            },
        }
    }

    fn seed_left(dir: &std::path::Path) {
        fs::write(
            dir.join("left.json"),
            r#"{"records":{"n1":{"key":"Buy milk","time":100}},"next_id":2,"sids":{}}"#,
        )
        .unwrap();
    }

    #[test]
    fn sync_runs_end_to_end_on_disk() {
        let dir = tempdir().unwrap();
        seed_left(dir.path());
        let spec = spec(dir.path(), SyncMode::Bidirectional);

        let outcome = run_relation(&spec, Operation::Sync { rebuild: false }).unwrap();
        assert!(matches!(
            outcome,
            RelationOutcome::Completed { entries: 1, repaired: 0 }
        ));

        // Map persisted and stamped, lock released, counterpart created.
        let map = MapStore::new(&spec.map).load().unwrap().unwrap();
        assert_eq!(map.relation, "notes");
        assert!(map.left_signature.starts_with("fs:"));
        assert!(!map.time.is_empty());
        assert!(!MapStore::new(&spec.map).is_locked());
        let right: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("right.json")).unwrap()).unwrap();
        assert_eq!(right["records"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn second_sync_reuses_the_map() {
        let dir = tempdir().unwrap();
        seed_left(dir.path());
        let spec = spec(dir.path(), SyncMode::Bidirectional);

        run_relation(&spec, Operation::Sync { rebuild: false }).unwrap();
        let first = MapStore::new(&spec.map).load().unwrap().unwrap();
        run_relation(&spec, Operation::Sync { rebuild: false }).unwrap();
        let second = MapStore::new(&spec.map).load().unwrap().unwrap();

        assert_eq!(second.entries, first.entries);
    }

    #[test]
    fn locked_relation_is_skipped_untouched() {
        let dir = tempdir().unwrap();
        seed_left(dir.path());
        let spec = spec(dir.path(), SyncMode::Bidirectional);
        fs::write(dir.path().join("notes.map.lock"), b"").unwrap();

        let outcome = run_relation(&spec, Operation::Sync { rebuild: false }).unwrap();
        assert!(matches!(outcome, RelationOutcome::SkippedLocked));
        assert!(!MapStore::new(&spec.map).exists());
    }

    #[test]
    fn force_update_without_a_map_is_refused_before_locking() {
        let dir = tempdir().unwrap();
        seed_left(dir.path());
        let spec = spec(dir.path(), SyncMode::Bidirectional);

        let err = run_relation(&spec, Operation::ForceUpdate { source: Side::Left });
        assert!(err.is_err());
        assert!(!MapStore::new(&spec.map).is_locked());
    }

    #[test]
    fn persist_failure_leaves_relation_locked() {
        let dir = tempdir().unwrap();
        seed_left(dir.path());
        let spec = spec(dir.path(), SyncMode::Bidirectional);

        // A directory squatting on the temp path makes the atomic save
        // fail after the pass has already run under the lock.
        fs::create_dir(dir.path().join("notes.map.tmp")).unwrap();

        let err = run_relation(&spec, Operation::Sync { rebuild: false });
        assert!(err.is_err());

        // The marker survives for unlock --rollback, no map was
        // persisted, and the next scheduled run skips the relation.
        let store = MapStore::new(&spec.map);
        assert!(store.is_locked());
        assert!(!store.exists());
        let outcome = run_relation(&spec, Operation::Sync { rebuild: false }).unwrap();
        assert!(matches!(outcome, RelationOutcome::SkippedLocked));

        // Rollback recovery: the marker was empty (first run), so the
        // map stays absent and the relation unlocks cleanly.
        store.rollback(&spec.name).unwrap();
        store.force_unlock(&spec.name).unwrap();
        assert!(!store.is_locked());
        assert!(!store.exists());
    }

    #[test]
    fn rebuild_discards_the_map_first() {
        let dir = tempdir().unwrap();
        seed_left(dir.path());
        let spec = spec(dir.path(), SyncMode::Bidirectional);

        run_relation(&spec, Operation::Sync { rebuild: false }).unwrap();
        let outcome = run_relation(&spec, Operation::Sync { rebuild: true }).unwrap();

        // Rebuild re-runs initial sync: the left record matches the
        // previously created right counterpart by key.
        assert!(matches!(
            outcome,
            RelationOutcome::Completed { entries: 1, repaired: 0 }
        ));
    }
}
