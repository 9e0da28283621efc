//! Translator dispatch between endpoint kinds.
//!
//! Field-level translation (how one service's schema maps onto the
//! other's) is adapter business and lives outside the engine. The
//! engine only needs a narrow `translate` seam and a way to pick the
//! right translator for a configured endpoint pairing, once, when the
//! relation is constructed.

use crate::error::EngineResult;
use crate::record::Record;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies a family of endpoint adapters for translator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointKind(pub &'static str);

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Turns a foreign record into the payload pushed to a target endpoint.
///
/// `existing` is the target-side record being updated, or `None` on
/// create. Implementations own all endpoint-pair-specific business
/// rules (title mangling, tag/category mapping, reminder times).
pub trait Translator: Send + Sync {
    /// Produces the target-side payload for `foreign`.
    fn translate(&self, foreign: &Record, existing: Option<&Record>) -> EngineResult<Record>;
}

/// Passes the foreign record's content through unchanged.
///
/// The fallback for pairings with no registered translator, and the
/// natural choice when both endpoints share a schema.
#[derive(Debug, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, foreign: &Record, existing: Option<&Record>) -> EngineResult<Record> {
        Ok(Record {
            id: existing.map(|r| r.id.clone()).unwrap_or_default(),
            key: foreign.key.clone(),
            time: foreign.time,
            extra: foreign.extra.clone(),
        })
    }
}

/// Explicit dispatch table keyed by `(source kind, target kind)`.
///
/// Resolved once per relation at construction; adding a new endpoint
/// kind is a pure addition to the registry.
#[derive(Default)]
pub struct TranslatorRegistry {
    table: HashMap<(EndpointKind, EndpointKind), Arc<dyn Translator>>,
}

impl TranslatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the translator used when pushing `source`-kind records
    /// to a `target`-kind endpoint.
    pub fn register(
        &mut self,
        source: EndpointKind,
        target: EndpointKind,
        translator: impl Translator + 'static,
    ) {
        self.table.insert((source, target), Arc::new(translator));
    }

    /// Resolves the translator for a pairing, falling back to
    /// [`IdentityTranslator`].
    #[must_use]
    pub fn resolve(&self, source: EndpointKind, target: EndpointKind) -> Arc<dyn Translator> {
        self.table
            .get(&(source, target))
            .cloned()
            .unwrap_or_else(|| Arc::new(IdentityTranslator))
    }
}

impl fmt::Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorRegistry")
            .field("pairings", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}
