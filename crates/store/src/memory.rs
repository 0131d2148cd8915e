//! In-process storage backends.
//!
//! These hold everything in `RwLock`-guarded maps and are the backends
//! wired into the worker binary. They enforce the same transition and
//! ownership rules a database-backed implementation would, so the
//! orchestrator can be tested against real semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use prism_core::types::{JobId, UserId};

use crate::record::{AssetRecord, JobFilter, JobRecord, JobStatus};
use crate::traits::{AssetStore, CreditLedger, DebitOutcome, JobStore};
use crate::StoreError;

fn poisoned() -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update` to the job if the transition to `next` is legal.
    fn transition(
        &self,
        id: JobId,
        next: JobStatus,
        update: impl FnOnce(&mut JobRecord),
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        if !job.status.can_transition_to(next) {
            return Err(StoreError::Conflict(format!(
                "job {} cannot move from {} to {}",
                id, job.status, next
            )));
        }
        job.status = next;
        update(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "job {} already exists",
                record.id
            )));
        }
        jobs.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<JobRecord, StoreError> {
        self.jobs
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("job"))
    }

    async fn get_owned(&self, user_id: UserId, id: JobId) -> Result<JobRecord, StoreError> {
        let job = self.get(id).await?;
        // Foreign jobs are indistinguishable from absent ones.
        if job.user_id != user_id {
            return Err(StoreError::NotFound("job"));
        }
        Ok(job)
    }

    async fn list(&self, user_id: UserId, filter: JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut matched: Vec<JobRecord> = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.effective_limit())
            .collect())
    }

    async fn mark_queued(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Queued, |job| {
            job.queued_at = Some(chrono::Utc::now());
        })
    }

    async fn mark_processing(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Processing, |job| {
            job.started_at = Some(chrono::Utc::now());
        })
    }

    async fn set_progress(
        &self,
        id: JobId,
        progress: u8,
        stage: Option<String>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        job.progress = progress.min(100);
        if stage.is_some() {
            job.stage = stage;
        }
        Ok(())
    }

    async fn mark_completed(&self, id: JobId, results: Vec<String>) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.progress = 100;
            job.results = results;
            job.completed_at = Some(chrono::Utc::now());
        })
    }

    async fn mark_failed(&self, id: JobId, error: &str) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Failed, |job| {
            job.error_message = Some(error.to_string());
            job.completed_at = Some(chrono::Utc::now());
        })
    }

    async fn mark_cancelled(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Cancelled, |job| {
            job.completed_at = Some(chrono::Utc::now());
        })
    }

    async fn delete(&self, user_id: UserId, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get(&id).ok_or(StoreError::NotFound("job"))?;
        if job.user_id != user_id {
            return Err(StoreError::NotFound("job"));
        }
        if !job.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "job {} is still {}",
                id, job.status
            )));
        }
        jobs.remove(&id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAssetStore {
    assets: RwLock<Vec<AssetRecord>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn record(&self, asset: AssetRecord) -> Result<(), StoreError> {
        self.assets.write().map_err(|_| poisoned())?.push(asset);
        Ok(())
    }

    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<AssetRecord>, StoreError> {
        Ok(self
            .assets
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|a| a.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn exists(&self, user_id: UserId, filename: &str) -> Result<bool, StoreError> {
        Ok(self
            .assets
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .any(|a| a.user_id == user_id && a.filename == filename))
    }
}

// ---------------------------------------------------------------------------
// Credits
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    balances: HashMap<UserId, u32>,
    /// job id -> amount taken, for idempotent debits.
    debits: HashMap<JobId, u32>,
}

#[derive(Default)]
pub struct MemoryCreditLedger {
    state: RwLock<LedgerState>,
}

impl MemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-seeded with one balance, for tests and local runs.
    pub fn with_balance(user_id: UserId, balance: u32) -> Self {
        let ledger = Self::default();
        if let Ok(mut state) = ledger.state.write() {
            state.balances.insert(user_id, balance);
        }
        ledger
    }
}

#[async_trait]
impl CreditLedger for MemoryCreditLedger {
    async fn balance(&self, user_id: UserId) -> Result<u32, StoreError> {
        Ok(self
            .state
            .read()
            .map_err(|_| poisoned())?
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn debit(
        &self,
        user_id: UserId,
        amount: u32,
        job_id: JobId,
    ) -> Result<DebitOutcome, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let available = state.balances.get(&user_id).copied().unwrap_or(0);
        if state.debits.contains_key(&job_id) {
            return Ok(DebitOutcome::AlreadyDebited {
                remaining: available,
            });
        }
        if available < amount {
            return Ok(DebitOutcome::Insufficient { available });
        }
        let remaining = available - amount;
        state.balances.insert(user_id, remaining);
        state.debits.insert(job_id, amount);
        Ok(DebitOutcome::Debited { remaining })
    }

    async fn credit(&self, user_id: UserId, amount: u32) -> Result<u32, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let balance = state.balances.entry(user_id).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use prism_core::job::JobKind;
    use serde_json::json;
    use uuid::Uuid;

    fn record(user_id: UserId) -> JobRecord {
        JobRecord::new(
            Uuid::new_v4(),
            user_id,
            JobKind::Text2Image,
            json!({"prompt": "a cat"}),
            0,
            1,
        )
    }

    #[tokio::test]
    async fn job_lifecycle_happy_path() {
        let store = MemoryJobStore::new();
        let job = record(Uuid::new_v4());
        let id = job.id;

        store.create(job).await.unwrap();
        store.mark_queued(id).await.unwrap();
        store.mark_processing(id).await.unwrap();
        store.set_progress(id, 40, Some("Sampling".to_string())).await.unwrap();
        store
            .mark_completed(id, vec!["out.png".to_string()])
            .await
            .unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.results, vec!["out.png".to_string()]);
        assert!(job.queued_at.is_some());
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_a_conflict() {
        let store = MemoryJobStore::new();
        let job = record(Uuid::new_v4());
        let id = job.id;
        store.create(job).await.unwrap();

        // Pending -> Processing skips Queued.
        assert_matches!(
            store.mark_processing(id).await,
            Err(StoreError::Conflict(_))
        );

        store.mark_queued(id).await.unwrap();
        store.mark_processing(id).await.unwrap();
        assert_matches!(store.mark_cancelled(id).await, Err(StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_owned_hides_foreign_jobs() {
        let store = MemoryJobStore::new();
        let owner = Uuid::new_v4();
        let job = record(owner);
        let id = job.id;
        store.create(job).await.unwrap();

        store.get_owned(owner, id).await.unwrap();
        assert_matches!(
            store.get_owned(Uuid::new_v4(), id).await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn list_filters_by_status_and_pages() {
        let store = MemoryJobStore::new();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            store.create(record(user)).await.unwrap();
        }
        let completed = record(user);
        let completed_id = completed.id;
        store.create(completed).await.unwrap();
        store.mark_queued(completed_id).await.unwrap();
        store.mark_processing(completed_id).await.unwrap();
        store.mark_completed(completed_id, Vec::new()).await.unwrap();

        let all = store.list(user, JobFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);

        let filter = JobFilter {
            status: Some(JobStatus::Completed),
            ..Default::default()
        };
        let done = store.list(user, filter).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, completed_id);

        let filter = JobFilter {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        assert_eq!(store.list(user, filter).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_requires_a_terminal_state() {
        let store = MemoryJobStore::new();
        let user = Uuid::new_v4();
        let job = record(user);
        let id = job.id;
        store.create(job).await.unwrap();

        assert_matches!(store.delete(user, id).await, Err(StoreError::Conflict(_)));

        store.mark_queued(id).await.unwrap();
        store.mark_cancelled(id).await.unwrap();
        store.delete(user, id).await.unwrap();
        assert_matches!(store.get(id).await, Err(StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn asset_exists_is_per_user() {
        let store = MemoryAssetStore::new();
        let user = Uuid::new_v4();
        store
            .record(AssetRecord {
                id: Uuid::new_v4(),
                user_id: user,
                job_id: None,
                filename: "input.png".to_string(),
                kind: "image".to_string(),
                size_bytes: 1024,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.exists(user, "input.png").await.unwrap());
        assert!(!store.exists(user, "other.png").await.unwrap());
        assert!(!store.exists(Uuid::new_v4(), "input.png").await.unwrap());
    }

    #[tokio::test]
    async fn debit_takes_credits_once_per_job() {
        let user = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let ledger = MemoryCreditLedger::with_balance(user, 10);

        assert_eq!(
            ledger.debit(user, 3, job_id).await.unwrap(),
            DebitOutcome::Debited { remaining: 7 }
        );
        // Same job id: no double charge.
        assert_eq!(
            ledger.debit(user, 3, job_id).await.unwrap(),
            DebitOutcome::AlreadyDebited { remaining: 7 }
        );
        assert_eq!(ledger.balance(user).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn insufficient_balance_takes_nothing() {
        let user = Uuid::new_v4();
        let ledger = MemoryCreditLedger::with_balance(user, 2);

        assert_eq!(
            ledger.debit(user, 5, Uuid::new_v4()).await.unwrap(),
            DebitOutcome::Insufficient { available: 2 }
        );
        assert_eq!(ledger.balance(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn credit_tops_up() {
        let user = Uuid::new_v4();
        let ledger = MemoryCreditLedger::new();
        assert_eq!(ledger.balance(user).await.unwrap(), 0);
        assert_eq!(ledger.credit(user, 25).await.unwrap(), 25);
        assert_eq!(ledger.balance(user).await.unwrap(), 25);
    }
}
