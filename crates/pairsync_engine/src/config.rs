//! Per-relation engine configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction discipline for one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Changes propagate both ways.
    #[default]
    Bidirectional,
    /// The left endpoint is authoritative; independent right-side
    /// changes are overwritten, untracked right records are left alone.
    Unidirectional,
    /// Like `Unidirectional`, but untracked right records are deleted.
    UnidirectionalStrict,
}

impl SyncMode {
    /// Returns true if right-side changes propagate to the left.
    #[must_use]
    pub fn is_bidirectional(&self) -> bool {
        matches!(self, SyncMode::Bidirectional)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Bidirectional => write!(f, "bidirectional"),
            SyncMode::Unidirectional => write!(f, "unidirectional"),
            SyncMode::UnidirectionalStrict => write!(f, "unidirectional-strict"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bidirectional" => Ok(SyncMode::Bidirectional),
            "unidirectional" => Ok(SyncMode::Unidirectional),
            "unidirectional-strict" => Ok(SyncMode::UnidirectionalStrict),
            other => Err(format!("unknown sync mode '{other}'")),
        }
    }
}

/// Configuration of one relation's reconciler.
#[derive(Debug, Clone)]
pub struct RelationConfig {
    /// Relation name (stamped onto the persisted map, used in logs).
    pub relation: String,
    /// Direction discipline.
    pub mode: SyncMode,
}

impl RelationConfig {
    /// Creates a bidirectional relation configuration.
    #[must_use]
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            mode: SyncMode::default(),
        }
    }

    /// Sets the sync mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }
}
