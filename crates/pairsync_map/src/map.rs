//! The correlation map: all entries of one relation plus run metadata.

use crate::entry::{CorrelationEntry, Sid};
use crate::error::MapResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The durable correlation map of one relation.
///
/// Serialized as a human-diffable JSON document:
///
/// ```json
/// {
///   "map": { "<sid>": {"key": "...", "left": {"id": "...", "time": 0},
///                      "right": {"id": "...", "time": 0}} },
///   "relation": "...", "left": "<signature>", "right": "<signature>",
///   "time": "<run timestamp>"
/// }
/// ```
///
/// Entries are keyed by sid in a `BTreeMap` so the serialized form is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CorrelationMap {
    /// Correlation entries keyed by sid.
    #[serde(rename = "map")]
    pub entries: BTreeMap<Sid, CorrelationEntry>,
    /// Relation name stamped at persistence time.
    #[serde(default)]
    pub relation: String,
    /// Left endpoint signature stamped at persistence time.
    #[serde(rename = "left", default)]
    pub left_signature: String,
    /// Right endpoint signature stamped at persistence time.
    #[serde(rename = "right", default)]
    pub right_signature: String,
    /// Timestamp of the run that produced this map.
    #[serde(default)]
    pub time: String,
}

impl CorrelationMap {
    /// Creates an empty map with no metadata stamped yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts an entry, replacing any previous entry with the same sid.
    pub fn insert(&mut self, sid: Sid, entry: CorrelationEntry) {
        self.entries.insert(sid, entry);
    }

    /// Looks up an entry by sid.
    #[must_use]
    pub fn get(&self, sid: &Sid) -> Option<&CorrelationEntry> {
        self.entries.get(sid)
    }

    /// Iterates over entries in sid order.
    pub fn values(&self) -> impl Iterator<Item = &CorrelationEntry> {
        self.entries.values()
    }

    /// Stamps relation name, endpoint signatures, and the run timestamp.
    pub fn stamp(
        &mut self,
        relation: impl Into<String>,
        left_signature: impl Into<String>,
        right_signature: impl Into<String>,
        time: impl Into<String>,
    ) {
        self.relation = relation.into();
        self.left_signature = left_signature.into();
        self.right_signature = right_signature.into();
        self.time = time.into();
    }

    /// Encodes the map as pretty-printed JSON.
    pub fn to_json(&self) -> MapResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes a map from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> MapResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
