//! Reset command implementation.

use crate::config::Config;
use crate::runner::{self, Operation, RelationOutcome};
use pairsync_engine::Side;
use std::error::Error;
use std::path::Path;

/// Rebuilds the side opposite `source`: every correlated counterpart is
/// deleted and recreated from `source`'s live records.
pub fn run(config_path: &Path, relation: &str, source: Side) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path)?;
    let spec = config.relation(relation).ok_or_else(|| {
        format!("no relation named '{relation}' in {}", config_path.display())
    })?;

    match runner::run_relation(spec, Operation::Reset { source })? {
        RelationOutcome::Completed { entries, .. } => {
            println!(
                "✓ {}: rebuilt the {} side from {} ({} entries)",
                spec.name,
                source.opposite(),
                source,
                entries
            );
            Ok(())
        }
        RelationOutcome::SkippedLocked => {
            Err(format!("relation '{relation}' is locked; run unlock first").into())
        }
    }
}
