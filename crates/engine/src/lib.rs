//! HTTP client and session tracking for the generation engine.
//!
//! Wraps the engine's REST surface (asset upload, prompt submission,
//! history polling, output retrieval) using [`reqwest`], and tracks one
//! [`session::EngineSession`] per in-flight job so that terminal
//! outcomes always release engine-side bookkeeping.

pub mod client;
pub mod poll;
pub mod session;

pub use client::{EngineClient, OutputRef, PollStatus};
pub use poll::await_completion;
pub use session::{EngineSession, SessionRegistry};

/// Errors from the engine client layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be reached at all (connect, DNS, request
    /// timeout). Worth retrying.
    #[error("Engine is not reachable: {0}")]
    Unavailable(String),

    /// Asset upload returned a non-2xx status.
    #[error("Asset upload failed ({status}): {body}")]
    UploadFailed { status: u16, body: String },

    /// The engine refused the submitted prompt. Not retryable.
    #[error("Engine rejected the prompt: {0}")]
    Rejected(String),

    /// Any other non-2xx response.
    #[error("Engine API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Unexpected engine response: {0}")]
    Protocol(String),

    /// The prompt ran on the engine and failed there.
    #[error("{0}")]
    Execution(String),

    /// The prompt did not reach a terminal state before the polling
    /// deadline.
    #[error("Generation did not complete within {0:?}")]
    Timeout(std::time::Duration),
}

impl EngineError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Unavailable(_))
    }
}
