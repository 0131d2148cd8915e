//! The submission facade: the one door into the job system.
//!
//! Admission runs every check before any side effect, and the single
//! side-effecting sequence is debit, persist, enqueue. Credits are
//! debited exactly once per job, at admission; a failed enqueue refunds
//! and withdraws the record so nothing half-admitted survives.

use std::sync::Arc;

use tracing::{info, warn};

use prism_core::cost::estimate_cost;
use prism_core::params::GenerationParams;
use prism_core::tier::Tier;
use prism_core::types::{JobId, UserId};
use prism_core::{CoreError, JobKind};
use prism_store::{
    AssetStore, CreditLedger, DebitOutcome, JobFilter, JobRecord, JobStatus, JobStore, StoreError,
};

use crate::queue::{CancelOutcome, JobQueue, QueuedJob};

/// What a successful submission hands back.
#[derive(Debug, Clone, Copy)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub estimated_credits: u32,
}

/// Orchestration entry point for everything user-initiated.
pub struct Facade {
    jobs: Arc<dyn JobStore>,
    assets: Arc<dyn AssetStore>,
    ledger: Arc<dyn CreditLedger>,
    queue: Arc<JobQueue>,
}

impl Facade {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        assets: Arc<dyn AssetStore>,
        ledger: Arc<dyn CreditLedger>,
        queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            jobs,
            assets,
            ledger,
            queue,
        }
    }

    /// Validate, charge, persist, and enqueue one job.
    pub async fn submit(
        &self,
        user_id: UserId,
        tier: Tier,
        kind: JobKind,
        raw_params: serde_json::Value,
    ) -> Result<SubmitReceipt, CoreError> {
        let params = GenerationParams::from_value(kind, raw_params)?;
        params.validate()?;
        self.check_tier_limits(tier, &params)?;
        self.check_input_assets(user_id, &params).await?;

        let cost = estimate_cost(&params);
        let job_id = JobId::new_v4();

        match self
            .ledger
            .debit(user_id, cost, job_id)
            .await
            .map_err(store_error)?
        {
            DebitOutcome::Debited { .. } | DebitOutcome::AlreadyDebited { .. } => {}
            DebitOutcome::Insufficient { available } => {
                return Err(CoreError::InsufficientCredits {
                    required: cost,
                    available,
                });
            }
        }

        let params_value = serde_json::to_value(&params)
            .map_err(|e| CoreError::Internal(format!("parameter serialization: {e}")))?;
        let mut record = JobRecord::new(job_id, user_id, kind, params_value, tier.priority(), cost);
        record.credits_used = Some(cost);
        self.jobs.create(record).await.map_err(store_error)?;

        let queued = QueuedJob {
            job_id,
            user_id,
            priority: tier.priority(),
        };
        if let Err(e) = self.queue.enqueue(queued) {
            // Undo admission completely; the caller may simply retry.
            warn!(%job_id, error = %e, "Enqueue rejected, rolling back admission");
            self.refund_and_withdraw(user_id, job_id, cost).await;
            return Err(CoreError::Conflict(e.to_string()));
        }
        self.jobs.mark_queued(job_id).await.map_err(store_error)?;

        info!(%job_id, %user_id, %kind, cost, "Job admitted");
        Ok(SubmitReceipt {
            job_id,
            estimated_credits: cost,
        })
    }

    /// Cancel an owned job that has not started processing.
    pub async fn cancel(&self, user_id: UserId, job_id: JobId) -> Result<(), CoreError> {
        let record = self.owned(user_id, job_id).await?;
        if !matches!(record.status, JobStatus::Pending | JobStatus::Queued) {
            return Err(CoreError::Conflict(format!(
                "job {} is {} and can no longer be cancelled",
                job_id, record.status
            )));
        }

        match self.queue.cancel(job_id) {
            CancelOutcome::TooLate => {
                return Err(CoreError::Conflict(format!(
                    "job {job_id} was already picked up by a worker"
                )));
            }
            // NotFound with a cancellable status means the entry never
            // reached the queue (admission raced); the record alone is
            // withdrawn.
            CancelOutcome::Removed | CancelOutcome::NotFound => {}
        }

        match self.jobs.mark_cancelled(job_id).await {
            Ok(()) => {
                info!(%job_id, %user_id, "Job cancelled");
                Ok(())
            }
            // A worker won the race between our status read and now.
            Err(StoreError::Conflict(msg)) => Err(CoreError::Conflict(msg)),
            Err(e) => Err(store_error(e)),
        }
    }

    /// Read-through to the job store, owner only.
    pub async fn get_status(&self, user_id: UserId, job_id: JobId) -> Result<JobRecord, CoreError> {
        self.owned(user_id, job_id).await
    }

    /// A user's jobs, newest first.
    pub async fn list(
        &self,
        user_id: UserId,
        filter: JobFilter,
    ) -> Result<Vec<JobRecord>, CoreError> {
        self.jobs.list(user_id, filter).await.map_err(store_error)
    }

    /// Remove a finished job's record.
    pub async fn delete(&self, user_id: UserId, job_id: JobId) -> Result<(), CoreError> {
        self.jobs
            .delete(user_id, job_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => CoreError::NotFound {
                    entity: "job",
                    id: job_id,
                },
                StoreError::Conflict(msg) => CoreError::Conflict(msg),
                other => store_error(other),
            })
    }

    // ---- admission checks ----

    fn check_tier_limits(&self, tier: Tier, params: &GenerationParams) -> Result<(), CoreError> {
        if let Some((width, height)) = params.dimensions() {
            let ceiling = tier.max_resolution();
            if width > ceiling || height > ceiling {
                return Err(CoreError::Validation(format!(
                    "requested {width}x{height} exceeds the {ceiling}px ceiling of the {tier:?} tier"
                )));
            }
        }
        if let Some(steps) = params.steps() {
            let ceiling = tier.max_steps();
            if steps > ceiling {
                return Err(CoreError::Validation(format!(
                    "requested {steps} steps exceeds the {ceiling}-step ceiling of the {tier:?} tier"
                )));
            }
        }
        Ok(())
    }

    async fn check_input_assets(
        &self,
        user_id: UserId,
        params: &GenerationParams,
    ) -> Result<(), CoreError> {
        for filename in params.required_inputs() {
            let known = self
                .assets
                .exists(user_id, filename)
                .await
                .map_err(store_error)?;
            if !known {
                return Err(CoreError::Validation(format!(
                    "referenced input \"{filename}\" has not been uploaded"
                )));
            }
        }
        Ok(())
    }

    async fn owned(&self, user_id: UserId, job_id: JobId) -> Result<JobRecord, CoreError> {
        self.jobs
            .get_owned(user_id, job_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => CoreError::NotFound {
                    entity: "job",
                    id: job_id,
                },
                other => store_error(other),
            })
    }

    /// Best-effort rollback of a half-admitted job.
    async fn refund_and_withdraw(&self, user_id: UserId, job_id: JobId, cost: u32) {
        if let Err(e) = self.ledger.credit(user_id, cost).await {
            warn!(%job_id, error = %e, "Could not refund credits for rejected admission");
        }
        if let Err(e) = self.jobs.mark_failed(job_id, "queue rejected the job").await {
            warn!(%job_id, error = %e, "Could not mark rejected job as failed");
        }
    }
}

fn store_error(e: StoreError) -> CoreError {
    CoreError::Internal(e.to_string())
}
