//! Retry, backoff and failure handling.

mod common;

use pulse_jobs::{EnqueueOptions, JobError, JobStatus};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_retry_then_success() {
    let queue = common::queue(1);
    let calls = Arc::new(AtomicU32::new(0));

    let handler_calls = Arc::clone(&calls);
    queue.register_handler("flaky", move |_data, _ctx| {
        let calls = Arc::clone(&handler_calls);
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(JobError::failed("not yet"))
            } else {
                Ok(json!("done"))
            }
        }
    });

    let start = tokio::time::Instant::now();
    let id = queue.enqueue_raw("flaky", Value::Null, EnqueueOptions::new().max_attempts(3));
    let record = queue.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.result, Some(json!("done")));
    assert!(record.completed_at.is_some());
    // Backoff after attempts 1 and 2: 2s then 4s.
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_keep_last_error() {
    let queue = common::queue(1);
    queue.register_handler("always_fails", |_data, ctx| async move {
        Err::<Value, _>(JobError::failed(format!("failure #{}", ctx.attempt)))
    });

    let id = queue.enqueue_raw("always_fails", Value::Null, EnqueueOptions::new().max_attempts(3));
    let record = queue.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.error.as_deref(), Some("failure #3"));
    assert!(record.result.is_none());
    assert_eq!(queue.get_stats().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flaky_job_with_two_attempts_fails() {
    let queue = common::queue(1);
    queue.register_handler("flaky", |_data, _ctx| async {
        Err::<Value, _>(JobError::from(anyhow::anyhow!("boom")))
    });

    let id = queue.enqueue_raw("flaky", Value::Null, EnqueueOptions::new().max_attempts(2));
    let record = queue.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.error.as_deref(), Some("boom"));
}

#[tokio::test(start_paused = true)]
async fn test_status_is_retrying_during_backoff() {
    let queue = common::queue(1);
    queue.register_handler("flaky", |_data, ctx| async move {
        if ctx.attempt == 1 {
            Err(JobError::failed("transient"))
        } else {
            Ok(Value::Null)
        }
    });

    let id = queue.enqueue_raw("flaky", Value::Null, EnqueueOptions::new());
    common::wait_until(|| queue.get_status(&id).unwrap().status == JobStatus::Retrying).await;

    let record = queue.get_status(&id).unwrap();
    assert_eq!(record.attempts, 1);
    assert_eq!(record.error.as_deref(), Some("transient"));
    assert_eq!(queue.get_stats().retrying, 1);

    let record = queue.wait(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_error_skips_retries() {
    let queue = common::queue(1);
    queue.register_handler("gone", |_data, _ctx| async {
        Err::<Value, _>(JobError::unrecoverable("account deleted"))
    });

    let id = queue.enqueue_raw("gone", Value::Null, EnqueueOptions::new().max_attempts(5));
    let record = queue.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.error.as_deref(), Some("account deleted"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_attempt_and_frees_slot() {
    let queue = common::queue(1);
    queue.register_handler("hang", |_data, _ctx| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    });
    common::register_echo(&queue);

    let hung = queue.enqueue_raw(
        "hang",
        Value::Null,
        EnqueueOptions::new()
            .max_attempts(1)
            .timeout(Duration::from_secs(1)),
    );
    let echo = queue.enqueue(&common::Echo { value: 1 }, EnqueueOptions::new());

    let record = queue.wait(&hung).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("Job timed out after 1000ms"));

    let record = queue.wait(&echo).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_is_retried_then_failed() {
    let queue = common::queue(1);
    queue.register_handler("explode", |_data, _ctx| async {
        if true {
            panic!("kaboom");
        }
        Ok(Value::Null)
    });

    let id = queue.enqueue_raw("explode", Value::Null, EnqueueOptions::new().max_attempts(2));
    let record = queue.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.error.as_deref(), Some("handler panicked: kaboom"));
    assert_eq!(queue.get_stats().processing, 0);
}

#[tokio::test(start_paused = true)]
async fn test_mismatched_typed_payload_fails_without_retry() {
    let queue = common::queue(1);
    common::register_echo(&queue);

    let id = queue.enqueue_raw("echo", json!({ "value": "twenty-one" }), EnqueueOptions::new());
    let record = queue.wait(&id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 1);
    assert!(record.error.unwrap().starts_with("Serialization error"));
}
