//! In-flight engine session tracking.
//!
//! Every submitted prompt gets a session entry keyed by job id. Workers
//! register on submit and unregister on every terminal outcome, success
//! or not, so the registry only ever holds jobs the engine is actually
//! working on.

use std::collections::HashMap;
use std::sync::RwLock;

use prism_core::types::{JobId, Timestamp};

/// One job currently executing on the engine.
#[derive(Debug, Clone)]
pub struct EngineSession {
    pub job_id: JobId,
    pub prompt_id: String,
    /// Number of status probes sent so far.
    pub polls: u32,
    pub started_at: Timestamp,
}

/// Shared map of in-flight sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<JobId, EngineSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly submitted prompt. Replaces any stale entry for
    /// the same job.
    pub fn register(&self, job_id: JobId, prompt_id: impl Into<String>) {
        let session = EngineSession {
            job_id,
            prompt_id: prompt_id.into(),
            polls: 0,
            started_at: chrono::Utc::now(),
        };
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(job_id, session);
        }
    }

    /// Drop the session for a job. Safe to call twice; failure paths
    /// unconditionally unregister.
    pub fn unregister(&self, job_id: JobId) -> Option<EngineSession> {
        self.sessions.write().ok()?.remove(&job_id)
    }

    /// Bump the poll counter for a job's session. Returns the new count,
    /// or `None` when no session is registered.
    pub fn record_poll(&self, job_id: JobId) -> Option<u32> {
        let mut sessions = self.sessions.write().ok()?;
        let session = sessions.get_mut(&job_id)?;
        session.polls += 1;
        Some(session.polls)
    }

    pub fn get(&self, job_id: JobId) -> Option<EngineSession> {
        self.sessions.read().ok()?.get(&job_id).cloned()
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.sessions
            .read()
            .map(|s| s.contains_key(&job_id))
            .unwrap_or(false)
    }

    /// Number of jobs currently on the engine.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
