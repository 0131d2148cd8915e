use crate::types::JobId;

/// Domain-level errors surfaced at the orchestration boundary.
///
/// Validation and credit errors are recovered before a job is admitted;
/// they never reach the queue.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: JobId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
