//! Correlation entries: one durable link between a left and a right record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two endpoints of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The left (authoritative for deletions) endpoint.
    Left,
    /// The right endpoint.
    Right,
}

impl Side {
    /// Returns the other side.
    #[must_use]
    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// A durable unique identifier correlating one left record with one
/// right record across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sid(String);

impl Sid {
    /// Allocates a fresh sid.
    #[must_use]
    pub fn generate() -> Self {
        Sid(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the sid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Sid {
    fn from(s: &str) -> Self {
        Sid(s.to_string())
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One side of a correlation entry: the record id on that endpoint and
/// the modification instant the map last saw for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEnd {
    /// Opaque record id on the owning endpoint.
    pub id: String,
    /// Modification instant (endpoint clock, milliseconds or whatever
    /// unit the endpoint reports — only ever compared to itself).
    pub time: i64,
}

impl EntryEnd {
    /// Creates a new entry end.
    #[must_use]
    pub fn new(id: impl Into<String>, time: i64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }
}

/// One durable correlation between a left record and a right record.
///
/// A well-formed entry always has both sides present. An entry missing
/// either side is transiently invalid (a remote call failed mid-pass)
/// and is removed by the validator before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    /// Human dedup key (e.g. the record title).
    pub key: String,
    /// Left endpoint's view, if written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<EntryEnd>,
    /// Right endpoint's view, if written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<EntryEnd>,
}

impl CorrelationEntry {
    /// Creates an entry with only one side written.
    #[must_use]
    pub fn half(key: impl Into<String>, side: Side, end: EntryEnd) -> Self {
        let mut entry = Self {
            key: key.into(),
            left: None,
            right: None,
        };
        *entry.side_mut(side) = Some(end);
        entry
    }

    /// Creates a complete entry.
    #[must_use]
    pub fn complete(key: impl Into<String>, left: EntryEnd, right: EntryEnd) -> Self {
        Self {
            key: key.into(),
            left: Some(left),
            right: Some(right),
        }
    }

    /// Returns the requested side.
    #[must_use]
    pub fn side(&self, side: Side) -> Option<&EntryEnd> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// Returns the requested side mutably.
    pub fn side_mut(&mut self, side: Side) -> &mut Option<EntryEnd> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Returns true if both sides are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }
}
