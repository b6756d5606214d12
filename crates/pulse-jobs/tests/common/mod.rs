//! Shared helpers for queue integration tests.
//!
//! Tests run on a paused Tokio clock, so backoff and delay timers resolve
//! instantly while keeping their relative order.

#![allow(dead_code)]

use parking_lot::Mutex;
use pulse_jobs::{JobPayload, JobQueue, JobsConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default config with the given concurrency.
pub fn config(concurrency: usize) -> JobsConfig {
    JobsConfig {
        concurrency,
        ..Default::default()
    }
}

pub fn queue(concurrency: usize) -> JobQueue {
    JobQueue::new(config(concurrency)).expect("Failed to create queue")
}

/// Poll `condition` every millisecond of virtual time.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("Condition not met in time");
}

/// Collects handler invocations in call order.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn push(&self, name: impl Into<String>) {
        self.seen.lock().push(name.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.seen.lock())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub value: i64,
}

impl JobPayload for Echo {
    const JOB_TYPE: &'static str = "echo";
    type Output = i64;
}

/// Register the `echo` handler, which doubles its input.
pub fn register_echo(queue: &JobQueue) {
    queue.register(|job: Echo, _ctx| async move { Ok(job.value * 2) });
}
