//! Job records, identifiers and the typed payload trait.

use crate::error::JobResult;
use crate::queue::Priority;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
///
/// ```text
/// pending ──► processing ──► completed
///    │            │
///    │            ├──► retrying ──► pending
///    │            │
///    └────────────┴──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue (or for its start delay to elapse).
    #[default]
    Pending,
    /// Handler is running.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Attempts exhausted, or the failure was not retryable.
    Failed,
    /// Waiting out the backoff before returning to pending.
    Retrying,
}

impl JobStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Retrying => write!(f, "retrying"),
        }
    }
}

/// Full record of a job, as returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job ID.
    pub id: JobId,

    /// Handler key.
    pub job_type: String,

    /// Payload passed verbatim to the handler.
    pub data: Value,

    /// Dispatch priority.
    pub priority: Priority,

    /// Current status.
    pub status: JobStatus,

    /// Number of times the handler has been invoked.
    pub attempts: u32,

    /// Attempt cap, fixed at enqueue.
    pub max_attempts: u32,

    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the job was first picked up.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,

    /// Message of the most recent failure.
    pub error: Option<String>,

    /// Handler output, set on success only.
    pub result: Option<Value>,
}

impl JobRecord {
    pub(crate) fn new(
        job_type: impl Into<String>,
        data: Value,
        priority: Priority,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            data,
            priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    /// Returns true once the job has completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Deserialize the handler output into a concrete type.
    ///
    /// Returns `Ok(None)` if the job has not completed.
    pub fn output<T: DeserializeOwned>(&self) -> JobResult<Option<T>> {
        match &self.result {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub(crate) fn context(&self) -> JobContext {
        JobContext {
            job_id: self.id.clone(),
            job_type: self.job_type.clone(),
            attempt: self.attempts,
            max_attempts: self.max_attempts,
            priority: self.priority,
        }
    }
}

/// Job execution context handed to every handler invocation.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,

    /// Handler key.
    pub job_type: String,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum attempts allowed.
    pub max_attempts: u32,

    /// Dispatch priority.
    pub priority: Priority,
}

impl JobContext {
    /// Returns true if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns remaining attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

/// A typed job payload.
///
/// Binding the type key, payload shape and output shape together lets
/// [`JobQueue::register`](crate::JobQueue::register) and
/// [`JobQueue::enqueue`](crate::JobQueue::enqueue) check handlers against
/// payloads at compile time.
///
/// # Example
///
/// ```rust
/// use pulse_jobs::JobPayload;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct RefreshProfile {
///     handle: String,
/// }
///
/// impl JobPayload for RefreshProfile {
///     const JOB_TYPE: &'static str = "refresh_profile";
///     type Output = u64;
/// }
/// ```
pub trait JobPayload: Serialize + DeserializeOwned + Send + 'static {
    /// Handler key for this payload.
    const JOB_TYPE: &'static str;

    /// Value the handler produces on success.
    type Output: Serialize + DeserializeOwned + Send + 'static;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JobRecord {
        JobRecord::new("echo", json!({"value": 21}), Priority::Normal, 3, Utc::now())
    }

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_job_id_display() {
        let id = JobId::from("job-1");
        assert_eq!(id.to_string(), "job-1");
        assert_eq!(id.as_str(), "job-1");
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = record();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.max_attempts, 3);
        assert!(record.started_at.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_zero_max_attempts_is_clamped() {
        let record = JobRecord::new("echo", Value::Null, Priority::Low, 0, Utc::now());
        assert_eq!(record.max_attempts, 1);
    }

    #[test]
    fn test_output_deserializes_result() {
        let mut record = record();
        assert_eq!(record.output::<u64>().unwrap(), None);

        record.result = Some(json!(42));
        assert_eq!(record.output::<u64>().unwrap(), Some(42));
        assert!(record.output::<String>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Retrying).unwrap(), "\"retrying\"");
        assert_eq!(JobStatus::Processing.to_string(), "processing");
    }

    #[test]
    fn test_job_context() {
        let mut record = record();
        record.attempts = 1;
        let ctx = record.context();

        assert_eq!(ctx.attempt, 1);
        assert_eq!(ctx.max_attempts, 3);
        assert_eq!(ctx.remaining_attempts(), 2);
        assert!(!ctx.is_last_attempt());

        record.attempts = 3;
        assert!(record.context().is_last_attempt());
    }
}
