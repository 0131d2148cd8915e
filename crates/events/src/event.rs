//! Job lifecycle events and their wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use prism_core::types::{JobId, UserId};
use prism_store::JobStatus;

/// What a [`JobEvent`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventKind {
    Progress,
    Completed,
    Failed,
}

/// One observable change in a job's life.
///
/// `user_id` routes the event; it never appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub user_id: UserId,
    pub kind: JobEventKind,
    pub status: JobStatus,
    /// 0..=100.
    pub progress: u8,
    /// Human-readable stage or error description.
    pub message: String,
    /// Engine filenames of outputs, populated on completion.
    pub results: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// A progress tick on a processing job.
    pub fn progress(job_id: JobId, user_id: UserId, progress: u8, stage: impl Into<String>) -> Self {
        let stage = stage.into();
        Self {
            job_id,
            user_id,
            kind: JobEventKind::Progress,
            status: JobStatus::Processing,
            progress: progress.min(100),
            message: format!("Processing: {stage}..."),
            results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job_id: JobId, user_id: UserId, results: Vec<String>) -> Self {
        Self {
            job_id,
            user_id,
            kind: JobEventKind::Completed,
            status: JobStatus::Completed,
            progress: 100,
            message: "Generation Complete".to_string(),
            results,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job_id: JobId, user_id: UserId, error: impl Into<String>) -> Self {
        Self {
            job_id,
            user_id,
            kind: JobEventKind::Failed,
            status: JobStatus::Failed,
            progress: 0,
            message: error.into(),
            results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// The client-facing message for this event.
    ///
    /// The `type` discriminator and field set differ per kind; this is
    /// the contract live clients are written against.
    pub fn to_wire(&self) -> Value {
        match self.kind {
            JobEventKind::Progress => json!({
                "type": "job_progress",
                "jobId": self.job_id,
                "status": self.status,
                "progress": self.progress,
                "message": self.message,
                "results": self.results,
            }),
            JobEventKind::Completed => json!({
                "type": "job_complete",
                "jobId": self.job_id,
                "results": self.results,
                "outputs": self.results,
            }),
            JobEventKind::Failed => json!({
                "type": "job_failed",
                "jobId": self.job_id,
                "error": self.message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn progress_wire_shape() {
        let event = JobEvent::progress(Uuid::new_v4(), Uuid::new_v4(), 40, "Sampling");
        let wire = event.to_wire();
        assert_eq!(wire["type"], "job_progress");
        assert_eq!(wire["status"], "processing");
        assert_eq!(wire["progress"], 40);
        assert_eq!(wire["message"], "Processing: Sampling...");
        assert!(wire.get("user_id").is_none());
    }

    #[test]
    fn complete_wire_shape() {
        let event = JobEvent::completed(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec!["out.png".to_string()],
        );
        let wire = event.to_wire();
        assert_eq!(wire["type"], "job_complete");
        assert_eq!(wire["results"][0], "out.png");
        assert_eq!(wire["outputs"][0], "out.png");
    }

    #[test]
    fn failed_wire_shape_carries_error_verbatim() {
        let event = JobEvent::failed(Uuid::new_v4(), Uuid::new_v4(), "CUDA out of memory");
        let wire = event.to_wire();
        assert_eq!(wire["type"], "job_failed");
        assert_eq!(wire["error"], "CUDA out of memory");
    }

    #[test]
    fn progress_clamps_to_100() {
        let event = JobEvent::progress(Uuid::new_v4(), Uuid::new_v4(), 140, "late");
        assert_eq!(event.progress, 100);
    }
}
