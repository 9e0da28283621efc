//! CLI command implementations.

pub mod force_update;
pub mod reset;
pub mod sync;
pub mod unlock;
