//! An in-memory endpoint for tests and local experiments.

use crate::endpoint::Endpoint;
use crate::error::{EngineError, EngineResult};
use crate::record::{Record, Snapshot};
use crate::run::{IdFixup, RunState};
use crate::translate::EndpointKind;
use pairsync_map::{Sid, Side};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Kind tag for [`MemoryEndpoint`].
pub const MEMORY_KIND: EndpointKind = EndpointKind("memory");

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, Record>,
    id_prefix: String,
    next_id: u64,
    next_time: i64,
    created_by_sid: HashMap<Sid, String>,
    fail_create_keys: HashSet<String>,
    fail_update_ids: HashSet<String>,
    stage_temp_ids: bool,
    staged: Vec<(Sid, String, String, i64)>,
    update_calls: Vec<(String, Sid)>,
    delete_calls: Vec<String>,
    committed: bool,
}

impl Inner {
    fn tick(&mut self) -> i64 {
        self.next_time += 1;
        self.next_time
    }

    fn assign_id(&mut self) -> String {
        let id = format!("{}{}", self.id_prefix, self.next_id);
        self.next_id += 1;
        id
    }
}

/// An in-memory record store implementing the full capability contract.
///
/// State lives behind an `Arc`, so a clone of the endpoint kept outside
/// the reconciler observes everything the engine did to it. Supports
/// scripted failure injection, records its remote calls, and can hand
/// out temporary ids from `create` reconciled in `commit_run` to
/// exercise the id-fixup path.
#[derive(Debug, Clone, Default)]
pub struct MemoryEndpoint {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryEndpoint {
    /// Creates an empty endpoint named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let endpoint = Self {
            name: name.into(),
            inner: Arc::default(),
        };
        {
            let mut inner = endpoint.inner.lock().unwrap();
            inner.id_prefix = "m".into();
            inner.next_id = 1;
        }
        endpoint
    }

    /// Sets the prefix of server-assigned ids (`<prefix><n>`).
    #[must_use]
    pub fn with_id_prefix(self, prefix: impl Into<String>) -> Self {
        self.inner.lock().unwrap().id_prefix = prefix.into();
        self
    }

    /// Sets the next id counter.
    #[must_use]
    pub fn with_next_id(self, next_id: u64) -> Self {
        self.inner.lock().unwrap().next_id = next_id;
        self
    }

    /// Sets the clock; each create/update gets `next_time + 1, + 2, ...`.
    #[must_use]
    pub fn with_next_time(self, next_time: i64) -> Self {
        self.inner.lock().unwrap().next_time = next_time;
        self
    }

    /// Seeds a record.
    #[must_use]
    pub fn with_record(self, record: Record) -> Self {
        self.insert(record);
        self
    }

    /// Inserts or replaces a record (out-of-band edit between runs).
    pub fn insert(&self, record: Record) {
        self.inner
            .lock()
            .unwrap()
            .records
            .insert(record.id.clone(), record);
    }

    /// Removes a record directly (out-of-band deletion between runs).
    pub fn remove(&self, id: &str) {
        self.inner.lock().unwrap().records.remove(id);
    }

    /// Bumps a record's modification time without changing content.
    pub fn touch(&self, id: &str, time: i64) {
        if let Some(record) = self.inner.lock().unwrap().records.get_mut(id) {
            record.time = time;
        }
    }

    /// Makes `create` fail for records with this key.
    pub fn fail_create_for_key(&self, key: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .fail_create_keys
            .insert(key.into());
    }

    /// Makes `update` fail for this target id.
    pub fn fail_update_for_id(&self, id: impl Into<String>) {
        self.inner.lock().unwrap().fail_update_ids.insert(id.into());
    }

    /// Hands out `tmp-<n>` ids from `create`, reconciled to real ids in
    /// `commit_run`.
    pub fn stage_temp_ids(&self) {
        self.inner.lock().unwrap().stage_temp_ids = true;
    }

    /// Current records, keyed by id.
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, Record> {
        self.inner.lock().unwrap().records.clone()
    }

    /// Returns the record with exactly this key, if any.
    #[must_use]
    pub fn record_by_key(&self, key: &str) -> Option<Record> {
        self.inner
            .lock()
            .unwrap()
            .records
            .values()
            .find(|r| r.key == key)
            .cloned()
    }

    /// `(target id, sid)` pairs of every `update` call, in order.
    #[must_use]
    pub fn update_calls(&self) -> Vec<(String, Sid)> {
        self.inner.lock().unwrap().update_calls.clone()
    }

    /// Ids of every `delete` call, in order.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().delete_calls.clone()
    }

    /// Whether `commit_run` was invoked.
    #[must_use]
    pub fn committed(&self) -> bool {
        self.inner.lock().unwrap().committed
    }
}

impl Endpoint for MemoryEndpoint {
    fn kind(&self) -> EndpointKind {
        MEMORY_KIND
    }

    fn signature(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn snapshot(&mut self, _previous: Option<&Snapshot>) -> EngineResult<Snapshot> {
        Ok(self.inner.lock().unwrap().records.values().cloned().collect())
    }

    fn get(&self, id: &str) -> EngineResult<Record> {
        self.inner
            .lock()
            .unwrap()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })
    }

    fn create(&mut self, source: &Record, sid: &Sid) -> EngineResult<Record> {
        let signature = self.signature();
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_create_keys.contains(&source.key) {
            return Err(EngineError::record_io(
                signature,
                format!("create failed for key '{}'", source.key),
            ));
        }
        // Retried with a sid we already served: return the existing
        // record instead of duplicating.
        if let Some(existing_id) = inner.created_by_sid.get(sid).cloned() {
            if let Some(record) = inner.records.get(&existing_id) {
                debug!(%sid, id = %existing_id, "create retried, returning existing record");
                return Ok(record.clone());
            }
        }

        let time = inner.tick();
        let real_id = inner.assign_id();
        let id = if inner.stage_temp_ids {
            let tmp = format!("tmp-{}", inner.staged.len() + 1);
            inner.staged.push((sid.clone(), tmp.clone(), real_id, time));
            tmp
        } else {
            real_id
        };

        let record = Record {
            id: id.clone(),
            key: source.key.clone(),
            time,
            extra: source.extra.clone(),
        };
        inner.records.insert(id.clone(), record.clone());
        inner.created_by_sid.insert(sid.clone(), id);
        Ok(record)
    }

    fn update(&mut self, source: &Record, id: &str, sid: &Sid) -> EngineResult<Record> {
        let signature = self.signature();
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_update_ids.contains(id) {
            return Err(EngineError::record_io(
                signature,
                format!("update failed for id '{id}'"),
            ));
        }
        let time = inner.tick();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;
        record.key = source.key.clone();
        record.extra = source.extra.clone();
        record.time = time;
        let updated = record.clone();
        inner.update_calls.push((id.to_string(), sid.clone()));
        Ok(updated)
    }

    fn delete(&mut self, id: &str, _sid: &Sid) -> EngineResult<()> {
        // Idempotent: deleting an already-gone record is not an error.
        let mut inner = self.inner.lock().unwrap();
        inner.records.remove(id);
        inner.delete_calls.push(id.to_string());
        Ok(())
    }

    fn find_by_key(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self.record_by_key(key).map(|r| r.id))
    }

    fn commit_run(&mut self, side: Side, run: &mut RunState) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.committed = true;
        let staged: Vec<_> = inner.staged.drain(..).collect();
        for (sid, tmp_id, real_id, time) in staged {
            if let Some(mut record) = inner.records.remove(&tmp_id) {
                record.id = real_id.clone();
                inner.records.insert(real_id.clone(), record);
            }
            inner.created_by_sid.insert(sid.clone(), real_id.clone());
            run.push_fixup(IdFixup {
                side,
                sid,
                id: real_id,
                time,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids_and_times() {
        let mut endpoint = MemoryEndpoint::new("m")
            .with_id_prefix("A")
            .with_next_id(2)
            .with_next_time(100);
        let created = endpoint
            .create(&Record::new("", "Buy milk", 100), &Sid::from("s1"))
            .unwrap();
        assert_eq!(created.id, "A2");
        assert_eq!(created.time, 101);
    }

    #[test]
    fn create_is_idempotent_per_sid() {
        let mut endpoint = MemoryEndpoint::new("m");
        let sid = Sid::from("s1");
        let first = endpoint.create(&Record::new("", "k", 1), &sid).unwrap();
        let second = endpoint.create(&Record::new("", "k", 1), &sid).unwrap();
        assert_eq!(first, second);
        assert_eq!(endpoint.records().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut endpoint = MemoryEndpoint::new("m").with_record(Record::new("A", "k", 1));
        endpoint.delete("A", &Sid::from("s1")).unwrap();
        endpoint.delete("A", &Sid::from("s1")).unwrap();
        assert_eq!(endpoint.delete_calls().len(), 2);
        assert!(endpoint.records().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let endpoint = MemoryEndpoint::new("m");
        let handle = endpoint.clone();
        endpoint.insert(Record::new("A", "k", 1));
        assert_eq!(handle.records().len(), 1);
    }

    #[test]
    fn staged_temp_ids_reconcile_in_commit() {
        let mut endpoint = MemoryEndpoint::new("m");
        endpoint.stage_temp_ids();
        let sid = Sid::from("s1");
        let created = endpoint.create(&Record::new("", "k", 1), &sid).unwrap();
        assert!(created.id.starts_with("tmp-"));

        let mut run = RunState::new();
        endpoint.commit_run(Side::Right, &mut run).unwrap();

        assert_eq!(run.fixups().len(), 1);
        assert_eq!(run.fixups()[0].sid, sid);
        assert!(!run.fixups()[0].id.starts_with("tmp-"));
        assert!(endpoint.records().contains_key(&run.fixups()[0].id));
        assert!(!endpoint.records().contains_key(&created.id));
    }

    #[test]
    fn get_miss_is_not_found() {
        let endpoint = MemoryEndpoint::new("m");
        assert!(matches!(
            endpoint.get("nope"),
            Err(EngineError::NotFound { .. })
        ));
    }
}
