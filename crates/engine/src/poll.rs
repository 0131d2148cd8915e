//! Watching a submitted prompt run to completion.

use prism_core::retry::{poll_until, PollError, PollPolicy};
use prism_core::types::JobId;
use tracing::warn;

use crate::client::{EngineClient, OutputRef, PollStatus};
use crate::session::SessionRegistry;
use crate::EngineError;

/// Poll the engine on a fixed interval until the prompt completes,
/// errors, or the wall-clock deadline passes.
///
/// Transport errors on a single probe are logged and retried on the next
/// interval; the deadline is absolute and unaffected by them. `on_poll`
/// is invoked with the attempt number before each probe, which is where
/// progress reporting hangs off.
///
/// The session's poll counter is updated here; releasing the session is
/// the caller's job, on every outcome.
pub async fn await_completion<F>(
    client: &EngineClient,
    registry: &SessionRegistry,
    job_id: JobId,
    prompt_id: &str,
    policy: &PollPolicy,
    on_poll: F,
) -> Result<Vec<OutputRef>, EngineError>
where
    F: Fn(u32),
{
    let on_poll = &on_poll;
    let result = poll_until(policy, |attempt| async move {
        registry.record_poll(job_id);
        on_poll(attempt);

        match client.poll_status(prompt_id).await {
            Ok(PollStatus::Completed(outputs)) => Ok(Some(outputs)),
            Ok(PollStatus::Pending) => Ok(None),
            Ok(PollStatus::Errored(message)) => Err(EngineError::Execution(message)),
            Err(error) => {
                // A failed probe is not a failed job; the deadline still
                // bounds how long we keep trying.
                warn!(%job_id, prompt_id, attempt, %error, "Status probe failed");
                Ok(None)
            }
        }
    })
    .await;

    match result {
        Ok(outputs) => Ok(outputs),
        Err(PollError::DeadlineExceeded(deadline)) => Err(EngineError::Timeout(deadline)),
        Err(PollError::Terminal(error)) => Err(error),
    }
}
