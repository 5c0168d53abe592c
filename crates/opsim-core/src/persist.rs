//! Persistence seam for the state store.
//!
//! Persistence is best-effort and optional: the state store writes through
//! to a [`Persistence`] implementation when one is configured, and a write
//! failure must never fail the mutation that triggered it. The trait is
//! synchronous on purpose; implementations are expected to be cheap or to
//! buffer internally.

use thiserror::Error;

use crate::traffic::TrafficRecord;

/// JSON domain tree as persisted.
pub type DomainMap = serde_json::Map<String, serde_json::Value>;

/// Errors from a persistence backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// Underlying I/O or database failure.
    #[error("persistence I/O error: {0}")]
    Io(String),

    /// Stored blob could not be decoded.
    #[error("persistence decode error: {0}")]
    Decode(String),
}

/// Write-through sink for simulator state and traffic.
pub trait Persistence: Send + Sync {
    /// Load the most recent state snapshot, if one exists.
    fn load_state(&self) -> Result<Option<DomainMap>, PersistError>;

    /// Replace the state snapshot.
    fn save_state(&self, domains: &DomainMap) -> Result<(), PersistError>;

    /// Append one traffic record to the log.
    fn append_traffic(&self, record: &TrafficRecord) -> Result<(), PersistError>;
}
