//! Logbook - an embeddable task tracker engine.
//!
//! This library provides the state engine behind a task tracker:
//! - `models` - Tasks, epics, subtasks, and their derivation rules
//! - `history` - Recency-ordered access history with O(1) updates
//! - `storage` - The in-memory store and the durable file log
//! - `config` - Default data-directory resolution
//!
//! The engine is single-threaded and synchronous: every operation is a
//! direct computation over in-memory collections, and the file log performs
//! blocking I/O inline with each mutating call. Hosts that need concurrent
//! access must serialize calls externally.

pub mod config;
pub mod history;
pub mod models;
pub mod storage;

/// Library-level error type for Logbook operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input, detected before any state is touched.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A uniqueness or scheduling invariant would be violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced entity does not exist.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The durable log could not be read or written.
    ///
    /// By the time a write fails the in-memory mutation has already been
    /// applied; this error signals a durability gap, not a corrupted store.
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Result type alias for Logbook operations.
pub type Result<T> = std::result::Result<T, Error>;
