//! Dispatch loop and job execution.
//!
//! A single dispatcher task owns the decision of what runs next. It takes a
//! concurrency permit first and only then pops the best ready job, so a
//! higher-priority job enqueued while every slot is busy still jumps ahead
//! of older, lower-priority work. The permit travels with the job and is
//! released after the job's outcome has been recorded. Jobs whose type has
//! no handler are failed as soon as the dispatcher sees them, permit or not.

use crate::error::JobError;
use crate::events::JobEvent;
use crate::job::{JobId, JobRecord};
use crate::metrics::JobMetrics;
use crate::queue::Shared;
use crate::registry::JobHandler;
use crate::state::{FailOutcome, QueueState};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OwnedSemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A job picked for execution.
struct Dispatch {
    handler: JobHandler,
    record: JobRecord,
    timeout: Option<Duration>,
}

pub(crate) async fn run(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(concurrency = shared.config.concurrency, "Job dispatcher started");

    loop {
        if shared.is_stopped() {
            break;
        }
        reject_unhandled(&shared);

        // Enqueues wake the dispatcher even while every slot is busy, so
        // jobs with no handler fail without waiting for a permit.
        let permit = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shared.wake.notified() => continue,
        };

        let next = loop {
            if shared.is_stopped() {
                break None;
            }
            if let Some(job) = next_job(&shared) {
                break Some(job);
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break None,
                _ = shared.wake.notified() => {}
            }
        };
        let Some(job) = next else {
            break;
        };

        let span = info_span!(
            "job",
            job_id = %job.record.id,
            job_type = %job.record.job_type,
            attempt = job.record.attempts,
        );
        tokio::spawn(execute(Arc::clone(&shared), job, permit).instrument(span));
    }

    info!("Job dispatcher stopped");
}

/// Pop ready jobs until one has a handler. Jobs without one are failed on
/// the spot and never take a permit.
fn next_job(shared: &Shared) -> Option<Dispatch> {
    let mut state = shared.state.lock();

    while let Some((id, job_type)) = state.pop_ready() {
        let now = shared.clock.now();

        let Some(handler) = shared.handlers.get(&job_type) else {
            fail_unhandled(shared, &mut state, id, job_type);
            continue;
        };

        let Some(started) = state.start(&id, now) else {
            continue;
        };
        shared.record_sizes(&state);

        let record = started.record;
        if record.attempts == 1 {
            let waited = (now - record.created_at).to_std().unwrap_or_default();
            JobMetrics::job_wait_time(&job_type, waited);
        }
        JobMetrics::job_started(&job_type, record.attempts);
        shared.emit(JobEvent::Started {
            job_id: id,
            job_type,
            attempt: record.attempts,
        });

        return Some(Dispatch {
            handler,
            record,
            timeout: started.timeout,
        });
    }

    shared.record_sizes(&state);
    None
}

/// Fail every ready job whose type has no handler.
fn reject_unhandled(shared: &Shared) {
    let mut state = shared.state.lock();
    let orphans = state.take_unhandled(|job_type| shared.handlers.contains(job_type));
    if orphans.is_empty() {
        return;
    }

    for (id, job_type) in orphans {
        fail_unhandled(shared, &mut state, id, job_type);
    }
    shared.record_sizes(&state);
}

fn fail_unhandled(shared: &Shared, state: &mut QueueState, id: JobId, job_type: String) {
    let error = JobError::NoHandler(job_type.clone());
    let Some(record) = state.reject(&id, &error, shared.clock.now()) else {
        return;
    };

    warn!(job_id = %id, job_type = %job_type, "No handler registered for job type");
    JobMetrics::job_failed(&job_type, error.kind(), Duration::ZERO);
    shared.emit(JobEvent::Failed {
        job_id: id,
        job_type,
        attempts: record.attempts,
        error: error.to_string(),
    });
}

async fn execute(shared: Arc<Shared>, job: Dispatch, permit: OwnedSemaphorePermit) {
    let Dispatch {
        handler,
        record,
        timeout,
    } = job;
    let id = record.id.clone();
    let job_type = record.job_type.clone();
    let ctx = record.context();

    debug!(max_attempts = ctx.max_attempts, "Job started");
    let started = Instant::now();

    // The handler is called inside the future so a panic while building its
    // future is caught too.
    let run = AssertUnwindSafe(async move { handler(record.data, ctx).await }).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(Err(JobError::Timeout(limit))),
        },
        None => run.await,
    };
    let outcome = outcome.unwrap_or_else(|panic| {
        Err(JobError::failed(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        )))
    });

    let elapsed = started.elapsed();
    match outcome {
        Ok(value) => on_success(&shared, &id, &job_type, value, elapsed),
        Err(err) => on_failure(&shared, &id, &job_type, err, elapsed),
    }

    drop(permit);
}

fn on_success(shared: &Shared, id: &JobId, job_type: &str, value: Value, elapsed: Duration) {
    let mut state = shared.state.lock();
    let Some(record) = state.complete(id, value, shared.clock.now()) else {
        return;
    };
    shared.record_sizes(&state);

    info!(
        attempts = record.attempts,
        duration_ms = elapsed.as_millis() as u64,
        "Job completed"
    );
    JobMetrics::job_completed(job_type, elapsed);
    shared.emit(JobEvent::Completed {
        job_id: id.clone(),
        job_type: job_type.to_string(),
        attempts: record.attempts,
    });
}

fn on_failure(shared: &Arc<Shared>, id: &JobId, job_type: &str, err: JobError, elapsed: Duration) {
    let mut state = shared.state.lock();
    let outcome = state.fail(id, &err, shared.clock.now());
    shared.record_sizes(&state);

    match outcome {
        Some(FailOutcome::Retry { attempts }) => {
            let delay = shared.backoff.delay_for_attempt(attempts);
            warn!(
                error = %err,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Job failed, scheduling retry"
            );
            JobMetrics::job_retried(job_type, attempts);
            shared.emit(JobEvent::Retrying {
                job_id: id.clone(),
                job_type: job_type.to_string(),
                attempt: attempts,
                delay,
                error: err.to_string(),
            });
            drop(state);

            schedule_ready(shared, id.clone(), delay);
        }
        Some(FailOutcome::Failed(record)) => {
            error!(
                error = %err,
                error_kind = err.kind(),
                attempts = record.attempts,
                "Job failed"
            );
            JobMetrics::job_failed(job_type, err.kind(), elapsed);
            shared.emit(JobEvent::Failed {
                job_id: id.clone(),
                job_type: job_type.to_string(),
                attempts: record.attempts,
                error: err.to_string(),
            });
        }
        None => {}
    }
}

/// Move a delayed or retrying job into the ready queue after `delay`.
///
/// The timer is dropped if the queue shuts down first.
pub(crate) fn schedule_ready(shared: &Arc<Shared>, id: JobId, delay: Duration) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    if shared.is_stopped() {
        return;
    }

    let task_shared = Arc::clone(shared);
    shared.runtime.spawn(async move {
        tokio::select! {
            _ = shutdown_rx.recv() => {}
            _ = tokio::time::sleep(delay) => {
                let ready = task_shared.state.lock().make_ready(&id);
                if ready {
                    debug!(job_id = %id, "Job moved to ready queue");
                    task_shared.wake.notify_one();
                }
            }
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
