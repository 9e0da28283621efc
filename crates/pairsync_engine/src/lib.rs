//! # PairSync Reconciliation Engine
//!
//! Keeps two independently-owned record stores ("endpoints") in
//! agreement by diffing fresh snapshots against a durable correlation
//! map, propagating creates, updates, and deletes between them.
//!
//! This crate provides:
//! - The transient data model (`Record`, `Snapshot`)
//! - The `Endpoint` capability trait every adapter implements
//! - Translator dispatch keyed by endpoint kind pairs
//! - The `Reconciler` with `process`, `force_update`, and `reset_side`
//! - An in-memory endpoint for tests and local experiments
//!
//! ## Key Invariants
//!
//! - The left endpoint is authoritative for deletions in every mode
//! - Conflicts resolve to the strictly later modification time;
//!   exact ties resolve to the left endpoint
//! - A per-record remote failure degrades that entry (half-written,
//!   removed by the validator) and never aborts the pass
//! - Results are always written into a freshly allocated map; the
//!   previous map is never mutated in place

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod endpoint;
mod engine;
mod error;
mod memory;
mod record;
mod run;
mod translate;

pub use config::{RelationConfig, SyncMode};
pub use endpoint::Endpoint;
pub use engine::Reconciler;
pub use error::{EngineError, EngineResult};
pub use memory::MemoryEndpoint;
pub use record::{Record, Snapshot};
pub use run::{IdFixup, PassOutcome, RunState, SideCounters};
pub use translate::{EndpointKind, IdentityTranslator, Translator, TranslatorRegistry};

pub use pairsync_map::{CorrelationEntry, CorrelationMap, EntryEnd, Sid, Side};
