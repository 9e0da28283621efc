//! A file-backed JSON record store.

use chrono::Utc;
use pairsync_engine::{
    Endpoint, EndpointKind, EngineError, EngineResult, Record, RunState, Sid, Side, Snapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind tag for [`FsEndpoint`].
pub const FS_KIND: EndpointKind = EndpointKind("fs");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct StoreFile {
    records: BTreeMap<String, StoredRecord>,
    next_id: u64,
    // sid -> id memo, so a retried create returns the existing record.
    sids: BTreeMap<String, String>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            sids: BTreeMap::new(),
        }
    }
}

/// A record store persisted as one pretty-printed JSON document.
///
/// Every mutation is written through immediately via an atomic
/// temp-file-then-rename, so a crash between remote calls never leaves
/// a torn store. Ids are assigned by the store (`fs-<n>`) and are final
/// at create time, so no commit-time fixups are needed.
#[derive(Debug)]
pub struct FsEndpoint {
    path: PathBuf,
    store: StoreFile,
}

impl FsEndpoint {
    /// Opens the store at `path`, starting empty if the file does not
    /// exist yet. The parent directory must already exist.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(EngineError::init(format!(
                    "store directory {} does not exist",
                    parent.display()
                )));
            }
        }
        let store = if path.is_file() {
            let bytes = fs::read(&path).map_err(|e| {
                EngineError::init(format!("cannot read store {}: {e}", path.display()))
            })?;
            serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::init(format!("cannot parse store {}: {e}", path.display()))
            })?
        } else {
            StoreFile::default()
        };
        Ok(Self { path, store })
    }

    /// The store file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> EngineResult<()> {
        let json = serde_json::to_string_pretty(&self.store)
            .map_err(|e| EngineError::record_io(self.signature(), e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| EngineError::record_io(self.signature(), e.to_string()))
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn to_record(id: &str, stored: &StoredRecord) -> Record {
        Record {
            id: id.to_string(),
            key: stored.key.clone(),
            time: stored.time,
            extra: stored.extra.clone(),
        }
    }
}

impl Endpoint for FsEndpoint {
    fn kind(&self) -> EndpointKind {
        FS_KIND
    }

    fn signature(&self) -> String {
        format!("fs:{}", self.path.display())
    }

    fn snapshot(&mut self, _previous: Option<&Snapshot>) -> EngineResult<Snapshot> {
        Ok(self
            .store
            .records
            .iter()
            .map(|(id, stored)| Self::to_record(id, stored))
            .collect())
    }

    fn get(&self, id: &str) -> EngineResult<Record> {
        self.store
            .records
            .get(id)
            .map(|stored| Self::to_record(id, stored))
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })
    }

    fn create(&mut self, source: &Record, sid: &Sid) -> EngineResult<Record> {
        if let Some(id) = self.store.sids.get(sid.as_str()).cloned() {
            if let Some(stored) = self.store.records.get(&id) {
                debug!(%sid, id, "create retried, returning existing record");
                return Ok(Self::to_record(&id, stored));
            }
        }
        let id = format!("fs-{}", self.store.next_id);
        self.store.next_id += 1;
        let stored = StoredRecord {
            key: source.key.clone(),
            time: Self::now(),
            extra: source.extra.clone(),
        };
        self.store.records.insert(id.clone(), stored.clone());
        self.store.sids.insert(sid.as_str().to_string(), id.clone());
        self.persist()?;
        Ok(Self::to_record(&id, &stored))
    }

    fn update(&mut self, source: &Record, id: &str, sid: &Sid) -> EngineResult<Record> {
        let stored = self
            .store
            .records
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;
        stored.key = source.key.clone();
        stored.extra = source.extra.clone();
        // The clock may not tick between calls; keep per-record times
        // strictly increasing anyway.
        stored.time = Self::now().max(stored.time + 1);
        let updated = Self::to_record(id, stored);
        debug!(%sid, id, "record updated");
        self.persist()?;
        Ok(updated)
    }

    fn delete(&mut self, id: &str, sid: &Sid) -> EngineResult<()> {
        if self.store.records.remove(id).is_some() {
            self.store.sids.retain(|_, v| v != id);
            debug!(%sid, id, "record deleted");
            self.persist()?;
        } else {
            debug!(%sid, id, "delete of an already-gone record ignored");
        }
        Ok(())
    }

    fn find_by_key(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self
            .store
            .records
            .iter()
            .find(|(_, stored)| stored.key == key)
            .map(|(id, _)| id.clone()))
    }

    fn commit_run(&mut self, _side: Side, _run: &mut RunState) -> EngineResult<()> {
        // Ids are final at create time; nothing to reconcile.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_parent_directory_is_an_init_error() {
        let err = FsEndpoint::open("/nonexistent-pairsync-dir/store.json").unwrap_err();
        assert!(matches!(err, EngineError::Init(_)));
    }

    #[test]
    fn create_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let sid = Sid::from("s1");

        let mut endpoint = FsEndpoint::open(&path).unwrap();
        let created = endpoint
            .create(&Record::new("", "Buy milk", 100), &sid)
            .unwrap();
        assert_eq!(created.id, "fs-1");

        // A fresh handle sees the record and honors the sid memo.
        let mut reopened = FsEndpoint::open(&path).unwrap();
        let snapshot = reopened.snapshot(None).unwrap();
        assert_eq!(snapshot.len(), 1);
        let again = reopened
            .create(&Record::new("", "Buy milk", 100), &sid)
            .unwrap();
        assert_eq!(again.id, "fs-1");
        assert_eq!(reopened.snapshot(None).unwrap().len(), 1);
    }

    #[test]
    fn update_keeps_times_strictly_increasing() {
        let dir = tempdir().unwrap();
        let mut endpoint = FsEndpoint::open(dir.path().join("store.json")).unwrap();
        let sid = Sid::from("s1");
        let created = endpoint.create(&Record::new("", "k", 1), &sid).unwrap();

        let first = endpoint
            .update(&Record::new("", "k2", 1), &created.id, &sid)
            .unwrap();
        let second = endpoint
            .update(&Record::new("", "k3", 1), &created.id, &sid)
            .unwrap();
        assert!(first.time > created.time);
        assert!(second.time > first.time);
        assert_eq!(second.key, "k3");
    }

    #[test]
    fn delete_is_idempotent_and_clears_the_memo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let sid = Sid::from("s1");

        let mut endpoint = FsEndpoint::open(&path).unwrap();
        let created = endpoint.create(&Record::new("", "k", 1), &sid).unwrap();
        endpoint.delete(&created.id, &sid).unwrap();
        endpoint.delete(&created.id, &sid).unwrap();

        // Recreating with the same sid allocates a fresh id.
        let recreated = endpoint.create(&Record::new("", "k", 1), &sid).unwrap();
        assert_ne!(recreated.id, created.id);
    }

    #[test]
    fn find_by_key_is_exact() {
        let dir = tempdir().unwrap();
        let mut endpoint = FsEndpoint::open(dir.path().join("store.json")).unwrap();
        endpoint
            .create(&Record::new("", "Buy milk", 1), &Sid::from("s1"))
            .unwrap();

        assert!(endpoint.find_by_key("Buy milk").unwrap().is_some());
        assert!(endpoint.find_by_key("Buy mil").unwrap().is_none());
        assert!(endpoint.find_by_key("buy milk").unwrap().is_none());
    }

    #[test]
    fn mutations_leave_no_tmp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut endpoint = FsEndpoint::open(&path).unwrap();
        endpoint
            .create(&Record::new("", "k", 1), &Sid::from("s1"))
            .unwrap();
        assert!(path.is_file());
        assert!(!dir.path().join("store.tmp").exists());
    }
}
