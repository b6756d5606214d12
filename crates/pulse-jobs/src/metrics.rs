//! Prometheus-style metrics for job queue monitoring.
//!
//! Recording is a no-op until the host process installs a `metrics` recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "pulse_jobs_enqueued_total";
    /// Total handler invocations started.
    pub const JOBS_STARTED_TOTAL: &str = "pulse_jobs_started_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "pulse_jobs_completed_total";
    /// Total jobs failed permanently.
    pub const JOBS_FAILED_TOTAL: &str = "pulse_jobs_failed_total";
    /// Total retries scheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "pulse_jobs_retried_total";
    /// Total finished jobs removed by retention sweeps.
    pub const JOBS_PURGED_TOTAL: &str = "pulse_jobs_purged_total";

    /// Current pending jobs.
    pub const JOBS_PENDING: &str = "pulse_jobs_pending";
    /// Current active (processing) jobs.
    pub const JOBS_ACTIVE: &str = "pulse_jobs_active";

    /// Handler execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "pulse_job_duration_seconds";
    /// Time from enqueue to first start, in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "pulse_job_wait_time_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_STARTED_TOTAL,
        "Total number of handler invocations started"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed permanently"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(
        names::JOBS_PURGED_TOTAL,
        "Total number of finished jobs removed by retention sweeps"
    );

    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_gauge!(names::JOBS_ACTIVE, "Current number of processing jobs");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Handler execution duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time between enqueue and first start in seconds"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(job_type: &str, priority: &str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "job_type" => job_type.to_string(),
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record a handler invocation starting.
    pub fn job_started(job_type: &str, attempt: u32) {
        counter!(
            names::JOBS_STARTED_TOTAL,
            "job_type" => job_type.to_string(),
            "first_attempt" => (attempt == 1).to_string()
        )
        .increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(job_type: &str, duration: Duration) {
        counter!(
            names::JOBS_COMPLETED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job failed permanently.
    pub fn job_failed(job_type: &str, error_kind: &str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_type" => job_type.to_string(),
            "error_kind" => error_kind.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a retry being scheduled.
    pub fn job_retried(job_type: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "job_type" => job_type.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record job wait time.
    pub fn job_wait_time(job_type: &str, wait_time: Duration) {
        histogram!(
            names::JOB_WAIT_TIME_SECONDS,
            "job_type" => job_type.to_string()
        )
        .record(wait_time.as_secs_f64());
    }

    /// Record a retention sweep.
    pub fn jobs_purged(count: usize) {
        counter!(names::JOBS_PURGED_TOTAL).increment(count as u64);
    }

    /// Update queue size gauges.
    pub fn update_queue_sizes(pending: usize, active: usize) {
        gauge!(names::JOBS_PENDING).set(pending as f64);
        gauge!(names::JOBS_ACTIVE).set(active as f64);
    }
}
