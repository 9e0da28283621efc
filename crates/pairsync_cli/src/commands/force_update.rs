//! Force-update command implementation.

use crate::config::Config;
use crate::runner::{self, Operation, RelationOutcome};
use pairsync_engine::Side;
use std::error::Error;
use std::path::Path;

/// Re-pushes every correlated record of `relation` from `source`,
/// ignoring change detection.
pub fn run(config_path: &Path, relation: &str, source: Side) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path)?;
    let spec = config.relation(relation).ok_or_else(|| {
        format!("no relation named '{relation}' in {}", config_path.display())
    })?;

    match runner::run_relation(spec, Operation::ForceUpdate { source })? {
        RelationOutcome::Completed { entries, .. } => {
            println!("✓ {}: re-pushed {} entries from {}", spec.name, entries, source);
            Ok(())
        }
        RelationOutcome::SkippedLocked => {
            Err(format!("relation '{relation}' is locked; run unlock first").into())
        }
    }
}
