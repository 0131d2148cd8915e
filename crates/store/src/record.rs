//! Job and asset records and the job status machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use prism_core::job::JobKind;
use prism_core::types::{JobId, Timestamp, UserId};

/// Lifecycle states of a job.
///
/// Transitions are monotonic: `Pending → Queued → Processing` and then
/// exactly one terminal state. Cancellation is only reachable before a
/// worker picks the job up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a record in this state may move to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Queued, Processing)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One generation job as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub user_id: UserId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// The validated parameter set, as submitted.
    pub params: Value,
    /// Scheduling priority derived from the submitter's tier.
    pub priority: u8,
    /// 0..=100.
    pub progress: u8,
    /// Human-readable label of the current pipeline stage.
    pub stage: Option<String>,
    pub estimated_credits: u32,
    /// Set exactly once, at admission, when the debit lands.
    pub credits_used: Option<u32>,
    /// Engine filenames of the generated outputs.
    pub results: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub queued_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    /// A freshly admitted job, not yet queued.
    pub fn new(
        id: JobId,
        user_id: UserId,
        kind: JobKind,
        params: Value,
        priority: u8,
        estimated_credits: u32,
    ) -> Self {
        Self {
            id,
            user_id,
            kind,
            status: JobStatus::Pending,
            params,
            priority,
            progress: 0,
            stage: None,
            estimated_credits,
            credits_used: None,
            results: Vec::new(),
            error_message: None,
            created_at: chrono::Utc::now(),
            queued_at: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Filters for listing a user's jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    /// Defaults to 50, capped at 100.
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(50).min(100)
    }
}

/// One engine output (or uploaded input) tracked per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: uuid::Uuid,
    pub user_id: UserId,
    /// The producing job, absent for direct uploads.
    pub job_id: Option<JobId>,
    /// Engine-assigned filename.
    pub filename: String,
    /// "image" or "video".
    pub kind: String,
    pub size_bytes: u64,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn cancel_only_before_processing() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                JobStatus::Pending,
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn no_skipping_forward() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn filter_limit_is_capped() {
        assert_eq!(JobFilter::default().effective_limit(), 50);
        let filter = JobFilter {
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), 100);
    }
}
