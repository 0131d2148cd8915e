use std::time::Duration;

use prism_core::retry::{PollPolicy, RetryPolicy};
use prism_orchestrator::DEFAULT_WORKERS;

/// Worker process configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the generation engine (default: `http://127.0.0.1:8188`).
    pub engine_url: String,
    /// Number of concurrent workers (default: `5`).
    pub workers: usize,
    /// Bound on queued jobs (default: `100`).
    pub queue_capacity: usize,
    /// Seconds between status polls (default: `1`).
    pub poll_interval_secs: u64,
    /// Seconds before an in-flight job is abandoned (default: `600`).
    pub job_timeout_secs: u64,
    /// Seconds between relay heartbeat sweeps (default: `30`).
    pub heartbeat_secs: u64,
    /// Client id announced to the engine. One random id per process
    /// unless pinned.
    pub client_id: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default                 |
    /// |---------------------|-------------------------|
    /// | `ENGINE_URL`        | `http://127.0.0.1:8188` |
    /// | `WORKER_COUNT`      | `5`                     |
    /// | `QUEUE_CAPACITY`    | `100`                   |
    /// | `POLL_INTERVAL_SECS`| `1`                     |
    /// | `JOB_TIMEOUT_SECS`  | `600`                   |
    /// | `HEARTBEAT_SECS`    | `30`                    |
    /// | `ENGINE_CLIENT_ID`  | random per process      |
    pub fn from_env() -> Self {
        let engine_url =
            std::env::var("ENGINE_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());

        let workers: usize = std::env::var("WORKER_COUNT")
            .unwrap_or_else(|_| DEFAULT_WORKERS.to_string())
            .parse()
            .expect("WORKER_COUNT must be a valid usize");

        let queue_capacity: usize = std::env::var("QUEUE_CAPACITY")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("QUEUE_CAPACITY must be a valid usize");

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("POLL_INTERVAL_SECS must be a valid u64");

        let job_timeout_secs: u64 = std::env::var("JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("JOB_TIMEOUT_SECS must be a valid u64");

        let heartbeat_secs: u64 = std::env::var("HEARTBEAT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("HEARTBEAT_SECS must be a valid u64");

        let client_id = std::env::var("ENGINE_CLIENT_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        Self {
            engine_url,
            workers,
            queue_capacity,
            poll_interval_secs,
            job_timeout_secs,
            heartbeat_secs,
            client_id,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            deadline: Duration::from_secs(self.job_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
