//! Persistence layer for race histories.

/// Race history persistence and retrieval operations.
pub mod history;
/// Storage abstraction layer shared by history backends.
pub mod storage;
