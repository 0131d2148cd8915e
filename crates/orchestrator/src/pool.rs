//! The worker pool and per-job pipeline.
//!
//! A fixed number of workers pull from the [`JobQueue`] and drive each
//! job through upload, compile, submit, poll, and collect. The pool is
//! the sole admission control on the engine: its size bounds how many
//! prompts can be in flight at once.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use prism_compiler::compile;
use prism_core::params::GenerationParams;
use prism_core::retry::{retry_with_backoff, PollPolicy, RetryPolicy};
use prism_core::types::{JobId, UserId};
use prism_engine::{await_completion, EngineClient, EngineError, SessionRegistry};
use prism_events::{EventBus, JobEvent};
use prism_store::{AssetRecord, AssetStore, JobStore, StoreError};

use crate::queue::{JobQueue, QueuedJob};
use crate::upload::resolve_inline_payloads;

/// Worker count matching the engine's practical concurrency.
pub const DEFAULT_WORKERS: usize = 5;

/// Everything a worker needs, shared across the pool.
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub jobs: Arc<dyn JobStore>,
    pub assets: Arc<dyn AssetStore>,
    pub engine: EngineClient,
    pub sessions: Arc<SessionRegistry>,
    pub bus: Arc<EventBus>,
    pub retry: RetryPolicy,
    pub poll: PollPolicy,
    /// Our client id on the engine, shared by all workers.
    pub client_id: String,
}

/// Handle over the spawned worker tasks.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks pulling from the shared queue until
    /// `shutdown` fires.
    pub fn start(ctx: Arc<WorkerContext>, workers: usize, shutdown: CancellationToken) -> Self {
        let handles = (0..workers)
            .map(|worker| {
                let ctx = Arc::clone(&ctx);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { run_worker(worker, ctx, shutdown).await })
            })
            .collect();
        Self { handles }
    }

    /// Wait for every worker to drain and exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn run_worker(worker: usize, ctx: Arc<WorkerContext>, shutdown: CancellationToken) {
    debug!(worker, "Worker started");
    while let Some(claim) = ctx.queue.dequeue(&shutdown).await {
        process_job(worker, &ctx, claim).await;
    }
    debug!(worker, "Worker stopped");
}

/// How a pipeline run ended short of completion.
enum PipelineError {
    /// The job record disappeared while we owned it; someone else wins,
    /// nothing to report.
    Vanished,
    /// Terminal failure with the message to persist and relay.
    Fail(String),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => PipelineError::Vanished,
            other => PipelineError::Fail(other.to_string()),
        }
    }
}

/// Run one claimed job to a terminal state. Never lets an error escape
/// to the worker loop, and always releases session and claim.
async fn process_job(worker: usize, ctx: &WorkerContext, claim: QueuedJob) {
    let job_id = claim.job_id;
    let user_id = claim.user_id;
    info!(worker, %job_id, %user_id, "Processing job");

    match run_pipeline(ctx, &claim).await {
        Ok(results) => {
            info!(worker, %job_id, outputs = results.len(), "Job completed");
        }
        Err(PipelineError::Vanished) => {
            debug!(worker, %job_id, "Job record vanished mid-pipeline, dropping claim");
        }
        Err(PipelineError::Fail(message)) => {
            error!(worker, %job_id, error = %message, "Job failed");
            match ctx.jobs.mark_failed(job_id, &message).await {
                Ok(()) => ctx.bus.publish(JobEvent::failed(job_id, user_id, message)),
                Err(StoreError::NotFound(_)) => {
                    debug!(%job_id, "Job record gone before failure could be recorded");
                }
                Err(e) => error!(%job_id, error = %e, "Could not record job failure"),
            }
        }
    }

    ctx.sessions.unregister(job_id);
    ctx.queue.finish(job_id);
}

async fn run_pipeline(ctx: &WorkerContext, claim: &QueuedJob) -> Result<Vec<String>, PipelineError> {
    let job_id = claim.job_id;
    let user_id = claim.user_id;

    // A cancellation that raced the claim shows up as a transition
    // conflict here; the job is no longer ours.
    match ctx.jobs.mark_processing(job_id).await {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) | Err(StoreError::Conflict(_)) => {
            return Err(PipelineError::Vanished)
        }
        Err(e) => return Err(PipelineError::Fail(e.to_string())),
    }

    let record = ctx.jobs.get(job_id).await?;
    let mut raw_params = record.params.clone();

    stage(ctx, job_id, user_id, 5, "Uploading inputs").await?;
    resolve_inline_payloads(&ctx.engine, job_id, &mut raw_params)
        .await
        .map_err(|e| PipelineError::Fail(e.to_string()))?;

    let params: GenerationParams = serde_json::from_value(raw_params)
        .map_err(|e| PipelineError::Fail(format!("Stored parameters are invalid: {e}")))?;

    stage(ctx, job_id, user_id, 10, "Compiling workflow").await?;
    let compiled = compile(&params).map_err(|e| PipelineError::Fail(e.to_string()))?;
    for warning in &compiled.warnings {
        warn!(%job_id, warning, "Compiler warning");
    }

    stage(ctx, job_id, user_id, 15, "Submitting to engine").await?;
    let engine = &ctx.engine;
    let client_id = ctx.client_id.as_str();
    let graph = &compiled.graph;
    let prompt_id = retry_with_backoff(
        &ctx.retry,
        EngineError::is_transient,
        |_attempt| async move { engine.submit_prompt(graph, client_id).await },
    )
    .await
    .map_err(|e| PipelineError::Fail(e.to_string()))?;
    ctx.sessions.register(job_id, &prompt_id);
    debug!(%job_id, prompt_id, "Prompt accepted by engine");

    stage(ctx, job_id, user_id, 20, "Generating").await?;
    let bus = &ctx.bus;
    let outputs = await_completion(
        engine,
        &ctx.sessions,
        job_id,
        &prompt_id,
        &ctx.poll,
        move |attempt| {
            // The history API exposes no per-node progress; advance a
            // coarse estimate with each poll tick.
            let progress = (20 + attempt * 2).min(90) as u8;
            bus.publish(JobEvent::progress(job_id, user_id, progress, "Generating"));
        },
    )
    .await
    .map_err(|e| PipelineError::Fail(e.to_string()))?;

    stage(ctx, job_id, user_id, 95, "Collecting outputs").await?;
    let mut results = Vec::new();
    for output in &outputs {
        let bytes = ctx
            .engine
            .fetch_output(output)
            .await
            .map_err(|e| PipelineError::Fail(e.to_string()))?;
        ctx.assets
            .record(AssetRecord {
                id: uuid::Uuid::new_v4(),
                user_id,
                job_id: Some(job_id),
                filename: output.filename.clone(),
                kind: asset_kind(&output.filename).to_string(),
                size_bytes: bytes.len() as u64,
                created_at: chrono::Utc::now(),
            })
            .await?;
        results.push(output.filename.clone());
    }

    ctx.jobs.mark_completed(job_id, results.clone()).await?;
    ctx.bus
        .publish(JobEvent::completed(job_id, user_id, results.clone()));
    Ok(results)
}

/// Persist and relay a stage transition.
async fn stage(
    ctx: &WorkerContext,
    job_id: JobId,
    user_id: UserId,
    progress: u8,
    label: &str,
) -> Result<(), PipelineError> {
    ctx.jobs
        .set_progress(job_id, progress, Some(label.to_string()))
        .await?;
    ctx.bus
        .publish(JobEvent::progress(job_id, user_id, progress, label));
    Ok(())
}

fn asset_kind(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if [".mp4", ".webm", ".gif", ".mov"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        "video"
    } else {
        "image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_kind_by_extension() {
        assert_eq!(asset_kind("out_00001_.png"), "image");
        assert_eq!(asset_kind("clip.MP4"), "video");
        assert_eq!(asset_kind("loop.gif"), "video");
    }
}
