//! Errors returned across the host-facing boundary.

use thiserror::Error;

use crate::dao::storage::StorageError;

/// Errors surfaced by host-facing engine operations.
///
/// Event intake never returns these: stale or malformed pushes are logged and
/// dropped. They appear only on explicit host calls such as reading persisted
/// history.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The history storage backend failed.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No history store is installed; the engine runs in degraded mode.
    #[error("no history store installed (degraded mode)")]
    Degraded,
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::Unavailable(err)
    }
}
