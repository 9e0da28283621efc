//! Unlock command implementation.

use crate::config::Config;
use pairsync_map::MapStore;
use std::error::Error;
use std::path::Path;

/// Removes the lock marker of a relation left locked by a crashed run.
///
/// With `rollback`, the map is first restored to the pre-run snapshot
/// held in the marker.
pub fn run(config_path: &Path, relation: &str, rollback: bool) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path)?;
    let spec = config.relation(relation).ok_or_else(|| {
        format!("no relation named '{relation}' in {}", config_path.display())
    })?;

    let store = MapStore::new(&spec.map);
    if !store.is_locked() {
        println!("Relation '{relation}' is not locked");
        return Ok(());
    }

    if rollback {
        store.rollback(relation)?;
        println!("Map restored to the pre-run snapshot");
    }
    store.force_unlock(relation)?;
    println!("✓ {relation} unlocked");
    Ok(())
}
