//! # Pulse Worker
//!
//! Runs Social Pulse background jobs on an in-process queue.

pub mod handlers;

use pulse_config::AppConfig;
use pulse_jobs::{JobQueue, JobResult};
use tracing::info;

/// Create the job queue and register every product job handler.
pub fn build_queue(config: &AppConfig) -> JobResult<JobQueue> {
    let queue = JobQueue::new(config.jobs.clone())?;
    handlers::register_all(&queue);

    info!(job_types = ?queue.job_types(), "Job handlers registered");
    Ok(queue)
}
