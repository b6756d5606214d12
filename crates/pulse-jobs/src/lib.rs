//! Pulse Jobs - In-Memory Background Job Queue
//!
//! Runs background work for Social Pulse inside the service process:
//! - Four priority levels, FIFO within a level
//! - Bounded concurrency with a single dispatcher
//! - Retries with exponential backoff
//! - Delayed start
//! - Status queries, counts and lifecycle events
//! - Time-based retention of finished jobs
//!
//! Nothing is persisted; jobs are lost when the process exits.
//!
//! # Architecture
//!
//! ```text
//!  enqueue ──► live store ──(delay)──► ready heap ──► dispatcher ──► handler task
//!                  ▲                  (weight, age)   (permit first)      │
//!                  │                                                      │
//!                  └──────────── retrying ◄──(backoff)──── error ◄────────┤
//!                                                                         │
//!                          finished store ◄── completed / failed ◄────────┘
//!                                 │
//!                            sweeper (retention)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use pulse_jobs::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Double {
//!     value: i64,
//! }
//!
//! impl JobPayload for Double {
//!     const JOB_TYPE: &'static str = "double";
//!     type Output = i64;
//! }
//!
//! # async fn run() -> JobResult<()> {
//! let queue = JobQueue::new(JobsConfig::default())?;
//! queue.register(|job: Double, _ctx| async move { Ok(job.value * 2) });
//!
//! let id = queue.enqueue(&Double { value: 21 }, EnqueueOptions::new().priority(Priority::High));
//! let record = queue.wait(&id).await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
mod dispatcher;
pub mod error;
pub mod events;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod retry;
mod state;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackoffConfig, JobsConfig};
pub use error::{JobError, JobResult};
pub use events::JobEvent;
pub use job::{JobContext, JobId, JobPayload, JobRecord, JobStatus};
pub use metrics::{register_metrics, JobMetrics};
pub use queue::{EnqueueOptions, JobQueue, Priority, QueueStats};
pub use registry::{HandlerRegistry, JobHandler};
pub use retry::{BackoffPolicy, BackoffStrategy};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::job::{JobPayload, JobStatus};
    pub use crate::queue::{EnqueueOptions, JobQueue, Priority};
    pub use crate::{JobContext, JobError, JobId, JobResult, JobsConfig};
}
