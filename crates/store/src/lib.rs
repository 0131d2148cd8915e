//! Persistence contracts for jobs, generated assets, and credits.
//!
//! The orchestrator talks to storage through the traits in [`traits`];
//! [`memory`] provides the in-process implementations used by the worker
//! binary and by tests. Records and the job status machine live in
//! [`record`].

pub mod memory;
pub mod record;
pub mod traits;

pub use memory::{MemoryAssetStore, MemoryCreditLedger, MemoryJobStore};
pub use record::{AssetRecord, JobFilter, JobRecord, JobStatus};
pub use traits::{AssetStore, CreditLedger, DebitOutcome, JobStore};

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed record does not exist (or is not visible to the
    /// caller).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The requested change is not valid from the record's current
    /// state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backing store itself failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
