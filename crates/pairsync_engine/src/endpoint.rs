//! The capability contract every endpoint adapter implements.

use crate::error::EngineResult;
use crate::record::{Record, Snapshot};
use crate::run::RunState;
use crate::translate::EndpointKind;
use pairsync_map::{EntryEnd, Sid, Side};

/// One of the two record stores of a relation.
///
/// Adapters wrap arbitrary remote protocols behind this trait; the
/// engine treats both sides uniformly through it. Every method that
/// touches the remote service may fail per-record: the engine catches
/// such failures at the call site, degrades the affected entry, and
/// continues the pass.
pub trait Endpoint {
    /// Adapter family, used for translator dispatch.
    fn kind(&self) -> EndpointKind;

    /// Stable identifying metadata for this configured instance,
    /// persisted into the map to detect reconfiguration between runs.
    fn signature(&self) -> String;

    /// Fetches the full current record list.
    ///
    /// `previous` is last run's snapshot, offered as a hint for
    /// endpoints whose native API cannot report per-record modification
    /// times cheaply; most adapters ignore it.
    fn snapshot(&mut self, previous: Option<&Snapshot>) -> EngineResult<Snapshot>;

    /// Fetches one record by id. Fails with
    /// [`EngineError::NotFound`](crate::EngineError::NotFound) if absent.
    fn get(&self, id: &str) -> EngineResult<Record>;

    /// Materializes a new record derived from a foreign one.
    ///
    /// Must tolerate being retried with the same `sid` without
    /// duplicating. Adapters may stage a local temporary id here and
    /// reconcile it to the server-assigned id in [`Endpoint::commit_run`].
    fn create(&mut self, source: &Record, sid: &Sid) -> EngineResult<Record>;

    /// Pushes foreign content into the existing record `id` and returns
    /// the refreshed record (authoritative `{id, time}`).
    fn update(&mut self, source: &Record, id: &str, sid: &Sid) -> EngineResult<Record>;

    /// Removes or archives the record `id`. Must not fail if the record
    /// is already gone.
    fn delete(&mut self, id: &str, sid: &Sid) -> EngineResult<()>;

    /// Whether the live record differs from the state the map last saw.
    ///
    /// The default is a strict modification-time comparison; adapters
    /// may refine it with a secondary equality check (e.g. comparing
    /// the `extra` token) to suppress spurious signals from a timestamp
    /// bump with no semantic difference.
    fn changed(&self, stored: &EntryEnd, live: &Record) -> bool {
        stored.time < live.time
    }

    /// Returns the id of a record with exactly this key, if any.
    /// Used only during initial sync.
    fn find_by_key(&self, key: &str) -> EngineResult<Option<String>>;

    /// Called once per run after the pass completes.
    ///
    /// Lets an adapter reconcile temporary ids used during `create`
    /// into authoritative ones (via [`RunState::push_fixup`]) and
    /// release connection resources. The default does nothing.
    fn commit_run(&mut self, side: Side, run: &mut RunState) -> EngineResult<()> {
        let _ = (side, run);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEndpoint;

    #[test]
    fn default_changed_is_strict() {
        let endpoint = MemoryEndpoint::new("m");
        let stored = EntryEnd::new("A", 100);

        assert!(!endpoint.changed(&stored, &Record::new("A", "k", 100)));
        assert!(!endpoint.changed(&stored, &Record::new("A", "k", 99)));
        assert!(endpoint.changed(&stored, &Record::new("A", "k", 101)));
    }
}
