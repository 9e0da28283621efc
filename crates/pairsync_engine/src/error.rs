//! Error types for the reconciliation engine.

use pairsync_map::MapError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during a reconciliation pass.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Endpoint cannot establish connectivity or credentials.
    /// Fatal for the relation; surfaced before the lock is touched.
    #[error("session error: {0}")]
    Session(String),

    /// Endpoint misconfiguration (e.g. a referenced folder does not
    /// exist). Fatal for the relation.
    #[error("init error: {0}")]
    Init(String),

    /// A record lookup missed.
    #[error("record not found: {id}")]
    NotFound {
        /// The id that missed.
        id: String,
    },

    /// A single remote call failed. Recovered at the call site: the
    /// affected entry is degraded, the pass continues.
    #[error("{endpoint}: {message}")]
    RecordIo {
        /// Endpoint signature for diagnostics.
        endpoint: String,
        /// Underlying failure.
        message: String,
    },

    /// A translator rejected a foreign record.
    #[error("translate error: {0}")]
    Translate(String),

    /// Map persistence failure.
    #[error(transparent)]
    Map(#[from] MapError),
}

impl EngineError {
    /// Creates a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Creates an init error.
    pub fn init(message: impl Into<String>) -> Self {
        Self::Init(message.into())
    }

    /// Creates a per-record I/O error.
    pub fn record_io(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecordIo {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is fatal for the whole relation
    /// rather than recoverable for a single record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Session(_) | EngineError::Init(_) | EngineError::Map(_)
        )
    }
}
