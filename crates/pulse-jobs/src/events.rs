//! Lifecycle events published by the queue.

use crate::job::JobId;
use crate::queue::Priority;
use std::time::Duration;

/// A job lifecycle transition.
///
/// Delivered through [`JobQueue::subscribe`](crate::JobQueue::subscribe).
/// Subscribers that fall behind lose the oldest events; status queries stay
/// authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Job accepted by `enqueue`.
    Enqueued {
        job_id: JobId,
        job_type: String,
        priority: Priority,
        delay: Option<Duration>,
    },
    /// Handler invocation started.
    Started {
        job_id: JobId,
        job_type: String,
        attempt: u32,
    },
    /// Attempt failed; another attempt is scheduled.
    Retrying {
        job_id: JobId,
        job_type: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// Handler succeeded.
    Completed {
        job_id: JobId,
        job_type: String,
        attempts: u32,
    },
    /// Job failed for good.
    Failed {
        job_id: JobId,
        job_type: String,
        attempts: u32,
        error: String,
    },
}

impl JobEvent {
    /// The job this event belongs to.
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Enqueued { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Retrying { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}
