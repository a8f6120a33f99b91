//! Background job scheduling contract.
//!
//! The engine never runs its own worker. It asks an external scheduler to
//! run the contact job, and the scheduler calls back into
//! [`ContactEngine::perform_next_operation`](crate::ContactEngine::perform_next_operation).

use std::sync::Mutex;

/// How a dispatch interacts with an already scheduled job of the same action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Leave an existing scheduled job alone.
    Keep,
    /// Replace an existing scheduled job.
    Replace,
}

/// A request to run a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub action: String,
    pub conflict_strategy: ConflictStrategy,
    pub network_required: bool,
}

impl JobRequest {
    pub fn new(action: impl Into<String>, conflict_strategy: ConflictStrategy) -> Self {
        Self {
            action: action.into(),
            conflict_strategy,
            network_required: true,
        }
    }
}

/// Outcome of one job run, reported back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    /// Done. Follow-up work, if any, has already been dispatched.
    Finished,
    /// Transient failure. Run again later with backoff.
    Retry,
}

/// Schedules background jobs.
pub trait JobDispatcher: Send + Sync {
    fn dispatch(&self, request: JobRequest);
}

/// A dispatcher that only records requests. For tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<JobRequest>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Strategies of all recorded requests, in order.
    pub fn strategies(&self) -> Vec<ConflictStrategy> {
        self.requests()
            .into_iter()
            .map(|r| r.conflict_strategy)
            .collect()
    }

    pub fn clear(&self) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl JobDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: JobRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
    }
}
