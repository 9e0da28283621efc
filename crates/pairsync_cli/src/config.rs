//! The relations configuration file.

use crate::endpoint_fs::FsEndpoint;
use pairsync_engine::{Endpoint, EngineResult, SyncMode};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration document: every relation this installation
/// reconciles.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// All configured relations.
    pub relations: Vec<RelationSpec>,
}

impl Config {
    /// Loads and parses the configuration file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = fs::read(path)
            .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
        let config: Config = serde_json::from_slice(&bytes)
            .map_err(|e| format!("cannot parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Returns the named relation, if configured.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// One configured relation: a map file plus two endpoints.
#[derive(Debug, Deserialize)]
pub struct RelationSpec {
    /// Relation name, used for selection and stamped onto the map.
    pub name: String,
    /// Path of the persisted correlation map.
    pub map: PathBuf,
    /// Direction discipline; defaults to bidirectional.
    #[serde(default)]
    pub mode: SyncMode,
    /// Left endpoint (authoritative for deletions).
    pub left: EndpointSpec,
    /// Right endpoint.
    pub right: EndpointSpec,
}

/// A configured endpoint, tagged by adapter kind.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EndpointSpec {
    /// File-backed JSON record store.
    Fs {
        /// Path of the store file.
        path: PathBuf,
    },
}

impl EndpointSpec {
    /// Opens the configured endpoint.
    pub fn open(&self) -> EngineResult<Box<dyn Endpoint>> {
        match self {
            EndpointSpec::Fs { path } => Ok(Box::new(FsEndpoint::open(path)?)),
        }
    }
}
