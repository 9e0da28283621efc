//! # PairSync Correlation Map
//!
//! Durable cross-reference between two endpoints of a relation.
//!
//! This crate provides:
//! - The correlation map data model (`CorrelationMap`, `CorrelationEntry`)
//! - JSON persistence with atomic writes (`MapStore`)
//! - Advisory per-relation locking with a rollback snapshot (`LockGuard`)
//! - The post-pass integrity validator (`Validator`)
//!
//! ## Key Invariants
//!
//! - A persisted map is always the product of a fully completed pass
//!   (or the untouched previous pass, via rollback)
//! - A persisted entry always has both sides present; half-written
//!   entries exist only in memory between a pass and validation
//! - The lock marker holds the verbatim previous map bytes and doubles
//!   as the rollback snapshot

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod error;
mod map;
mod store;
mod validator;

pub use entry::{CorrelationEntry, EntryEnd, Side, Sid};
pub use error::{MapError, MapResult};
pub use map::CorrelationMap;
pub use store::{LockGuard, MapStore};
pub use validator::{RepairReport, Validator};
