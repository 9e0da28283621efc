//! Map file persistence, advisory locking, and rollback.

use crate::error::{MapError, MapResult};
use crate::map::CorrelationMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persistence handle for one relation's map file.
///
/// The map file is written only via an atomic temp-file-then-rename,
/// so a reader never observes a torn document. The lock marker is a
/// sibling file (same base name, `.lock` extension) whose content is
/// the verbatim previous map bytes, doubling as the rollback snapshot.
///
/// The lock is advisory: presence of the marker file, not an OS-level
/// exclusive lock. An interrupted process leaves the marker in place;
/// recovery is an explicit [`MapStore::rollback`] or
/// [`MapStore::force_unlock`].
#[derive(Debug, Clone)]
pub struct MapStore {
    path: PathBuf,
}

impl MapStore {
    /// Creates a store for the map file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the map file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the lock marker path (sibling, `.lock` extension).
    #[must_use]
    pub fn marker_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Returns true if a map file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns true if the relation is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.marker_path().is_file()
    }

    /// Loads the persisted map, or `None` if no map file exists yet
    /// (first run, triggers initial sync).
    pub fn load(&self) -> MapResult<Option<CorrelationMap>> {
        if !self.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(CorrelationMap::from_json(&bytes)?))
    }

    /// Persists the map atomically: write `<path>.tmp`, sync, rename.
    pub fn save(&self, map: &CorrelationMap) -> MapResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(map.to_json()?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = map.len(), "map persisted");
        Ok(())
    }

    /// Deletes the map file if present (full rebuild).
    pub fn remove(&self) -> MapResult<()> {
        if self.exists() {
            fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "map file removed");
        }
        Ok(())
    }

    /// Acquires the relation lock.
    ///
    /// Fails with [`MapError::Locked`] if a marker already exists; the
    /// map file is not touched in that case. On success the current map
    /// bytes (empty if no map exists yet) are copied into the marker
    /// before anything else happens.
    pub fn lock(&self, relation: &str) -> MapResult<LockGuard> {
        let marker = self.marker_path();
        if marker.is_file() {
            return Err(MapError::Locked {
                relation: relation.to_string(),
                marker: marker.display().to_string(),
            });
        }
        let snapshot = if self.exists() {
            fs::read(&self.path)?
        } else {
            Vec::new()
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)?;
        file.write_all(&snapshot)?;
        file.sync_all()?;
        debug!(relation, marker = %marker.display(), "relation locked");
        Ok(LockGuard {
            store: self.clone(),
            relation: relation.to_string(),
            released: false,
        })
    }

    /// Overwrites the live map file with the marker's saved bytes.
    ///
    /// An empty marker means no map existed when the lock was taken, so
    /// rollback removes the map file. The marker itself is kept; a
    /// subsequent unlock deletes it.
    pub fn rollback(&self, relation: &str) -> MapResult<()> {
        let marker = self.marker_path();
        if !marker.is_file() {
            return Err(MapError::NoMarker {
                relation: relation.to_string(),
            });
        }
        let snapshot = fs::read(&marker)?;
        if snapshot.is_empty() {
            self.remove()?;
        } else {
            let tmp = self.path.with_extension("tmp");
            {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&tmp)?;
                file.write_all(&snapshot)?;
                file.sync_all()?;
            }
            fs::rename(&tmp, &self.path)?;
        }
        info!(relation, "map rolled back to pre-run snapshot");
        Ok(())
    }

    /// Deletes the lock marker regardless of guard state (manual
    /// recovery). Warns when no marker exists.
    pub fn force_unlock(&self, relation: &str) -> MapResult<()> {
        let marker = self.marker_path();
        if marker.is_file() {
            fs::remove_file(&marker)?;
            info!(relation, "relation unlocked");
        } else {
            warn!(relation, "unlock requested but no lock marker exists");
        }
        Ok(())
    }
}

/// Holds the relation lock for the duration of one pass.
///
/// Dropping the guard without calling [`LockGuard::unlock`] leaves the
/// marker in place: a crashed run must be recovered explicitly, never
/// silently unlocked.
#[derive(Debug)]
pub struct LockGuard {
    store: MapStore,
    relation: String,
    released: bool,
}

impl LockGuard {
    /// Restores the map file from the rollback snapshot taken at lock
    /// time. The lock stays held.
    pub fn rollback(&self) -> MapResult<()> {
        self.store.rollback(&self.relation)
    }

    /// Releases the lock by deleting the marker.
    pub fn unlock(mut self) -> MapResult<()> {
        self.released = true;
        self.store.force_unlock(&self.relation)
    }

    /// Leaves the marker in place deliberately (pass-level failure:
    /// the relation stays locked for manual inspection).
    pub fn keep_locked(mut self) {
        self.released = true;
        warn!(
            relation = %self.relation,
            "pass failed, relation left locked for inspection"
        );
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                relation = %self.relation,
                marker = %self.store.marker_path().display(),
                "lock guard dropped without unlock, marker left in place"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CorrelationEntry, EntryEnd, Sid, Side};
    use tempfile::tempdir;

    fn sample_map() -> CorrelationMap {
        let mut map = CorrelationMap::new();
        map.insert(
            Sid::from("sid1"),
            CorrelationEntry::complete("Buy milk", EntryEnd::new("A", 100), EntryEnd::new("A2", 101)),
        );
        map.stamp("r1", "l", "r", "t0");
        map
    }

    #[test]
    fn load_missing_map_is_none() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        let map = sample_map();
        store.save(&map).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), map);
    }

    #[test]
    fn save_leaves_no_tmp_file() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        store.save(&sample_map()).unwrap();
        assert!(!dir.path().join("r1.tmp").exists());
    }

    #[test]
    fn double_lock_fails_without_touching_map() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        store.save(&sample_map()).unwrap();
        let before = fs::read(store.path()).unwrap();

        let guard = store.lock("r1").unwrap();
        let second = store.lock("r1");
        assert!(matches!(second, Err(MapError::Locked { .. })));
        assert_eq!(fs::read(store.path()).unwrap(), before);

        guard.unlock().unwrap();
        assert!(!store.is_locked());
    }

    #[test]
    fn marker_holds_verbatim_map_bytes() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        store.save(&sample_map()).unwrap();
        let map_bytes = fs::read(store.path()).unwrap();

        let guard = store.lock("r1").unwrap();
        assert_eq!(fs::read(store.marker_path()).unwrap(), map_bytes);
        guard.unlock().unwrap();
    }

    #[test]
    fn rollback_restores_previous_bytes() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        let original = sample_map();
        store.save(&original).unwrap();
        let before = fs::read(store.path()).unwrap();

        let guard = store.lock("r1").unwrap();

        // Simulate a pass that wrote a new (bad) map.
        let mut clobbered = original.clone();
        clobbered.stamp("r1", "l", "r", "t1");
        clobbered.insert(
            Sid::from("sid2"),
            CorrelationEntry::half("oops", Side::Left, EntryEnd::new("X", 1)),
        );
        store.save(&clobbered).unwrap();
        assert_ne!(fs::read(store.path()).unwrap(), before);

        guard.rollback().unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), before);
        guard.unlock().unwrap();
    }

    #[test]
    fn rollback_on_first_run_removes_map() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));

        let guard = store.lock("r1").unwrap();
        store.save(&sample_map()).unwrap();
        guard.rollback().unwrap();
        assert!(!store.exists());
        guard.unlock().unwrap();
    }

    #[test]
    fn force_unlock_without_marker_is_non_fatal() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("r1.json"));
        store.force_unlock("r1").unwrap();
    }
}
