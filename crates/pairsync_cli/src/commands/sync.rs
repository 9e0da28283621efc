//! Sync command implementation.

use crate::config::Config;
use crate::runner::{self, Operation, RelationOutcome};
use std::error::Error;
use std::path::Path;

/// Runs a reconciliation pass over all configured relations, or over
/// the one selected by name.
///
/// Locked relations are skipped with a warning; a failing relation is
/// reported and the remaining relations still run.
pub fn run(config_path: &Path, relation: Option<&str>, rebuild: bool) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path)?;
    let selected: Vec<_> = match relation {
        Some(name) => vec![config.relation(name).ok_or_else(|| {
            format!("no relation named '{name}' in {}", config_path.display())
        })?],
        None => config.relations.iter().collect(),
    };
    if selected.is_empty() {
        println!("No relations configured");
        return Ok(());
    }

    let mut failures = 0usize;
    for spec in selected {
        match runner::run_relation(spec, Operation::Sync { rebuild }) {
            Ok(RelationOutcome::Completed { entries, repaired }) => {
                println!("✓ {}: {} entries ({} repaired)", spec.name, entries, repaired);
            }
            Ok(RelationOutcome::SkippedLocked) => {
                println!("- {}: locked, skipped", spec.name);
            }
            Err(err) => {
                println!("✗ {}: {}", spec.name, err);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} relation(s) failed").into());
    }
    Ok(())
}
