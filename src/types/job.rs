//! GenerationJob type for tracking one caller's request.
//!
//! A GenerationJob follows a request from the moment the coordinator
//! receives it until the result is handed back. Jobs are never persisted.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DaemonError, ErrorCode};

use super::artifact::Artifact;

/// State of a generation job inside the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job constructed, admission not yet attempted.
    #[default]
    Queued,
    /// Admitted; waiting for the exclusive slot.
    Admitted,
    /// Holding the exclusive slot, backend call in flight.
    Running,
    /// Backend returned an artifact before the deadline.
    Completed,
    /// Backend reported an error before the deadline.
    BackendFailed,
    /// Deadline elapsed before the backend returned.
    TimedOut,
    /// Admission denied because the coordinator was full.
    Rejected,
}

impl JobStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Admitted => "admitted",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::BackendFailed => "backend_failed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Rejected => "rejected",
        }
    }

    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::BackendFailed
                | JobStatus::TimedOut
                | JobStatus::Rejected
        )
    }

    /// Returns true if the job holds a queue depth contribution.
    pub fn is_admitted(&self) -> bool {
        matches!(self, JobStatus::Admitted | JobStatus::Running)
    }

    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Admitted)
                | (Queued, Rejected)
                | (Admitted, Running)
                | (Admitted, BackendFailed)
                | (Running, Completed)
                | (Running, BackendFailed)
                | (Running, TimedOut)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request for generation, tracked from entry through delivery.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    /// Unique job identifier (UUID v4).
    pub job_id: String,

    /// Model prompt, opaque to the coordinator.
    pub prompt: String,

    /// Current job state.
    pub status: JobStatus,

    /// When the job was created.
    pub created_at: SystemTime,

    /// When the backend call started (None if it never ran).
    pub started_at: Option<SystemTime>,

    /// When the job reached a terminal state.
    pub finished_at: Option<SystemTime>,

    /// Location of the produced artifact on success.
    pub artifact_path: Option<PathBuf>,

    /// Error code if the job failed or was rejected.
    pub error_code: Option<String>,

    /// Human-readable error message.
    pub error_message: Option<String>,

    created: Instant,
}

impl GenerationJob {
    /// Creates a new job in the `Queued` state.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            status: JobStatus::Queued,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            artifact_path: None,
            error_code: None,
            error_message: None,
            created: Instant::now(),
        }
    }

    /// Time since the job was created.
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Marks the job as admitted.
    pub fn set_admitted(&mut self) {
        self.advance(JobStatus::Admitted);
    }

    /// Marks the job as running on the backend.
    pub fn set_running(&mut self) {
        self.advance(JobStatus::Running);
        self.started_at = Some(SystemTime::now());
    }

    /// Marks the job as completed with the produced artifact.
    pub fn set_completed(&mut self, artifact: &Artifact) {
        self.advance(JobStatus::Completed);
        self.artifact_path = Some(artifact.path.clone());
        self.finished_at = Some(SystemTime::now());
    }

    /// Marks a running job as failed.
    ///
    /// Timeouts land in `TimedOut`, everything else in `BackendFailed`.
    pub fn set_failed(&mut self, err: &DaemonError) {
        let next = if err.code == ErrorCode::GenerationTimeout {
            JobStatus::TimedOut
        } else {
            JobStatus::BackendFailed
        };
        self.advance(next);
        self.record_error(err);
    }

    /// Marks the job as rejected at admission.
    pub fn set_rejected(&mut self, err: &DaemonError) {
        self.advance(JobStatus::Rejected);
        self.record_error(err);
    }

    fn record_error(&mut self, err: &DaemonError) {
        self.error_code = Some(err.code.as_str().to_string());
        self.error_message = Some(err.message.clone());
        self.finished_at = Some(SystemTime::now());
    }

    fn advance(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }
}
