//! Error types for map persistence and locking.

use thiserror::Error;

/// Result type for map operations.
pub type MapResult<T> = Result<T, MapError>;

/// Errors that can occur while loading, persisting, or locking a
/// correlation map.
#[derive(Error, Debug)]
pub enum MapError {
    /// I/O error on the map file, lock marker, or temp file.
    #[error("map i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Map file is not valid JSON or has the wrong shape.
    #[error("map decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Another writer already holds the relation lock.
    #[error("relation '{relation}' is locked (marker: {marker})")]
    Locked {
        /// Relation name.
        relation: String,
        /// Path of the existing lock marker.
        marker: String,
    },

    /// Rollback was requested but no lock marker exists.
    #[error("no lock marker for relation '{relation}', nothing to roll back")]
    NoMarker {
        /// Relation name.
        relation: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_display() {
        let err = MapError::Locked {
            relation: "notes".into(),
            marker: "/tmp/notes.lock".into(),
        };
        assert!(err.to_string().contains("notes"));
        assert!(err.to_string().contains("locked"));
    }
}
