//! Transient per-run record views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One endpoint's view of one record for the current pass.
///
/// Produced fresh by [`Endpoint::snapshot`](crate::Endpoint::snapshot)
/// every run and never persisted as-is; only the `{id, time}` pair
/// survives into the correlation map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque record id on the owning endpoint.
    pub id: String,
    /// Human dedup key (e.g. title).
    pub key: String,
    /// Modification instant on the endpoint's clock.
    pub time: i64,
    /// Optional opaque equality token for `changed` refinement
    /// (e.g. a tag-set digest).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Record {
    /// Creates a record without an equality token.
    #[must_use]
    pub fn new(id: impl Into<String>, key: impl Into<String>, time: i64) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            time,
            extra: None,
        }
    }

    /// Attaches an equality token.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// The transient, freshly-fetched record list of one endpoint.
///
/// Keyed by record id. The incremental pass consumes resolved ids via
/// [`Snapshot::take`], so whatever remains after the loop is exactly
/// the new, as-yet-uncorrelated records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<String, Record>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, keyed by its id.
    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id.clone(), record);
    }

    /// Removes and returns a record by id.
    pub fn take(&mut self, id: &str) -> Option<Record> {
        self.records.remove(id)
    }

    /// Returns the id of the first record with an exactly matching key.
    #[must_use]
    pub fn find_by_key(&self, key: &str) -> Option<&str> {
        self.records
            .values()
            .find(|r| r.key == key)
            .map(|r| r.id.as_str())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Consumes the snapshot, yielding records in id order.
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        self.records.into_values()
    }
}

impl FromIterator<Record> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_record() {
        let mut snap: Snapshot = [Record::new("A", "Buy milk", 100)].into_iter().collect();
        assert_eq!(snap.take("A").unwrap().key, "Buy milk");
        assert!(snap.take("A").is_none());
        assert!(snap.is_empty());
    }

    #[test]
    fn find_by_key_is_exact() {
        let snap: Snapshot = [
            Record::new("A", "Buy milk", 100),
            Record::new("B", "Buy milk soon", 200),
        ]
        .into_iter()
        .collect();

        assert_eq!(snap.find_by_key("Buy milk"), Some("A"));
        assert_eq!(snap.find_by_key("buy milk"), None);
    }

    #[test]
    fn iteration_is_id_ordered() {
        let snap: Snapshot = [
            Record::new("b", "2", 0),
            Record::new("a", "1", 0),
            Record::new("c", "3", 0),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = snap.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
