//! Storage traits the orchestrator is written against.

use async_trait::async_trait;

use prism_core::types::{JobId, UserId};

use crate::record::{AssetRecord, JobFilter, JobRecord};
use crate::StoreError;

/// Persistence for job records.
///
/// Status-changing operations enforce the [`crate::record::JobStatus`]
/// transition rules and answer `Conflict` for anything out of order.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<JobRecord, StoreError>;

    /// Like `get`, but only visible to the owning user.
    async fn get_owned(&self, user_id: UserId, id: JobId) -> Result<JobRecord, StoreError>;

    /// A user's jobs, newest first.
    async fn list(&self, user_id: UserId, filter: JobFilter) -> Result<Vec<JobRecord>, StoreError>;

    async fn mark_queued(&self, id: JobId) -> Result<(), StoreError>;

    async fn mark_processing(&self, id: JobId) -> Result<(), StoreError>;

    /// Progress and stage label of a processing job.
    async fn set_progress(
        &self,
        id: JobId,
        progress: u8,
        stage: Option<String>,
    ) -> Result<(), StoreError>;

    async fn mark_completed(&self, id: JobId, results: Vec<String>) -> Result<(), StoreError>;

    async fn mark_failed(&self, id: JobId, error: &str) -> Result<(), StoreError>;

    async fn mark_cancelled(&self, id: JobId) -> Result<(), StoreError>;

    /// Remove a terminal job. Owned records only.
    async fn delete(&self, user_id: UserId, id: JobId) -> Result<(), StoreError>;
}

/// Persistence for generated outputs and uploaded inputs.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn record(&self, asset: AssetRecord) -> Result<(), StoreError>;

    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<AssetRecord>, StoreError>;

    /// Whether `filename` is a known asset of `user_id`. Used to verify
    /// input references before a job is admitted.
    async fn exists(&self, user_id: UserId, filename: &str) -> Result<bool, StoreError>;
}

/// Outcome of a debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The amount was taken from the balance.
    Debited { remaining: u32 },

    /// This job already paid; the balance is untouched.
    AlreadyDebited { remaining: u32 },

    /// The balance does not cover the amount; nothing was taken.
    Insufficient { available: u32 },
}

/// Credit accounting. Debits are keyed by job id and idempotent, so a
/// job is charged at most once no matter how often admission is retried.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: UserId) -> Result<u32, StoreError>;

    /// Atomically take `amount` from the user's balance on behalf of
    /// `job_id`.
    async fn debit(
        &self,
        user_id: UserId,
        amount: u32,
        job_id: JobId,
    ) -> Result<DebitOutcome, StoreError>;

    /// Add credits to a balance (grants, top-ups). Returns the new
    /// balance.
    async fn credit(&self, user_id: UserId, amount: u32) -> Result<u32, StoreError>;
}
