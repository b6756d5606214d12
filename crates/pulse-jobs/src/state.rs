//! Queue bookkeeping: ready heap, live jobs and finished jobs.
//!
//! Every job record lives in exactly one of two maps. `live` holds jobs that
//! are pending (queued or waiting out a start delay), processing or
//! retrying; `finished` holds completed and failed jobs until they are
//! purged. The ready heap only carries ordering keys for queued jobs.

use crate::error::JobError;
use crate::job::{JobId, JobRecord, JobStatus};
use crate::queue::{Priority, QueueStats};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Ordering key for a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    seq: u64,
    id: JobId,
}

impl Ord for ReadyEntry {
    // Max-heap: higher weight first, then earlier enqueue. `seq` follows
    // creation order and is immune to wall-clock steps.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .weight()
            .cmp(&other.priority.weight())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct LiveJob {
    record: JobRecord,
    seq: u64,
    timeout: Option<Duration>,
    queued: bool,
}

/// A job moved to `processing`, ready to hand to its handler.
#[derive(Debug)]
pub(crate) struct StartedJob {
    pub record: JobRecord,
    pub timeout: Option<Duration>,
}

/// What a failed attempt turned into.
#[derive(Debug)]
pub(crate) enum FailOutcome {
    /// Job is `retrying` after `attempts` handler runs.
    Retry { attempts: u32 },
    /// Job is `failed`.
    Failed(JobRecord),
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    ready: BinaryHeap<ReadyEntry>,
    live: HashMap<JobId, LiveJob>,
    finished: HashMap<JobId, JobRecord>,
    next_seq: u64,
    processing: usize,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new job. Queued jobs are dispatchable immediately; others
    /// wait for [`QueueState::make_ready`].
    pub fn admit(&mut self, record: JobRecord, timeout: Option<Duration>, queued: bool) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if queued {
            self.ready.push(ReadyEntry {
                priority: record.priority,
                seq,
                id: record.id.clone(),
            });
        }

        self.live.insert(
            record.id.clone(),
            LiveJob {
                record,
                seq,
                timeout,
                queued,
            },
        );
    }

    /// Put a delayed or retrying job into the ready heap as `pending`.
    pub fn make_ready(&mut self, id: &JobId) -> bool {
        let Some(job) = self.live.get_mut(id) else {
            return false;
        };
        if job.queued || job.record.status == JobStatus::Processing {
            return false;
        }

        job.record.status = JobStatus::Pending;
        job.queued = true;
        self.ready.push(ReadyEntry {
            priority: job.record.priority,
            seq: job.seq,
            id: id.clone(),
        });
        true
    }

    /// Pop the highest-ranked queued job, returning its id and type.
    pub fn pop_ready(&mut self) -> Option<(JobId, String)> {
        while let Some(entry) = self.ready.pop() {
            if let Some(job) = self.live.get_mut(&entry.id) {
                if job.queued {
                    job.queued = false;
                    return Some((entry.id, job.record.job_type.clone()));
                }
            }
        }
        None
    }

    /// Take queued jobs whose type has no handler out of the ready heap.
    ///
    /// The returned jobs are no longer queued; the caller rejects them.
    pub fn take_unhandled(&mut self, has_handler: impl Fn(&str) -> bool) -> Vec<(JobId, String)> {
        let live = &mut self.live;
        let mut taken = Vec::new();

        self.ready.retain(|entry| match live.get_mut(&entry.id) {
            Some(job) if job.queued && !has_handler(&job.record.job_type) => {
                job.queued = false;
                taken.push((entry.id.clone(), job.record.job_type.clone()));
                false
            }
            Some(job) => job.queued,
            None => false,
        });
        taken
    }

    /// Move a popped job to `processing` and count the attempt.
    pub fn start(&mut self, id: &JobId, now: DateTime<Utc>) -> Option<StartedJob> {
        let job = self.live.get_mut(id)?;
        job.record.status = JobStatus::Processing;
        job.record.attempts += 1;
        job.record.started_at.get_or_insert(now);
        self.processing += 1;

        Some(StartedJob {
            record: job.record.clone(),
            timeout: job.timeout,
        })
    }

    /// Record a successful attempt.
    pub fn complete(&mut self, id: &JobId, result: Value, now: DateTime<Utc>) -> Option<JobRecord> {
        let mut record = self.live.remove(id)?.record;
        self.processing = self.processing.saturating_sub(1);
        record.status = JobStatus::Completed;
        record.result = Some(result);
        record.completed_at = Some(now);

        self.finished.insert(id.clone(), record.clone());
        Some(record)
    }

    /// Record a failed attempt, deciding between retry and failure.
    pub fn fail(&mut self, id: &JobId, error: &JobError, now: DateTime<Utc>) -> Option<FailOutcome> {
        let job = self.live.get_mut(id)?;
        job.record.error = Some(error.to_string());
        self.processing = self.processing.saturating_sub(1);

        if error.is_retryable() && job.record.attempts < job.record.max_attempts {
            job.record.status = JobStatus::Retrying;
            return Some(FailOutcome::Retry {
                attempts: job.record.attempts,
            });
        }

        self.finish_failed(id, now).map(FailOutcome::Failed)
    }

    /// Fail a job that never reached its handler.
    pub fn reject(&mut self, id: &JobId, error: &JobError, now: DateTime<Utc>) -> Option<JobRecord> {
        let job = self.live.get_mut(id)?;
        job.record.error = Some(error.to_string());
        self.finish_failed(id, now)
    }

    fn finish_failed(&mut self, id: &JobId, now: DateTime<Utc>) -> Option<JobRecord> {
        let mut record = self.live.remove(id)?.record;
        record.status = JobStatus::Failed;
        record.completed_at = Some(now);

        self.finished.insert(id.clone(), record.clone());
        Some(record)
    }

    /// Finished store first, then live jobs.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.finished
            .get(id)
            .or_else(|| self.live.get(id).map(|job| &job.record))
            .cloned()
    }

    /// Queued and processing counts, for the size gauges.
    pub fn gauges(&self) -> (usize, usize) {
        (self.ready.len(), self.processing)
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();

        for job in self.live.values() {
            match job.record.status {
                JobStatus::Pending if job.queued => stats.pending += 1,
                JobStatus::Pending => stats.delayed += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::Completed | JobStatus::Failed => {}
            }
        }
        for record in self.finished.values() {
            match record.status {
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                _ => {}
            }
        }
        stats.active = stats.processing;

        stats
    }

    /// Drop finished jobs that completed at or before `cutoff`.
    pub fn purge_finished_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.finished.len();
        self.finished
            .retain(|_, record| record.completed_at.map_or(true, |done| done > cutoff));
        before - self.finished.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn admit(state: &mut QueueState, priority: Priority, at: DateTime<Utc>) -> JobId {
        let record = JobRecord::new("echo", json!(null), priority, 3, at);
        let id = record.id.clone();
        state.admit(record, None, true);
        id
    }

    fn drain(state: &mut QueueState) -> Vec<JobId> {
        std::iter::from_fn(|| state.pop_ready().map(|(id, _)| id)).collect()
    }

    #[test]
    fn test_priority_order() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let low = admit(&mut state, Priority::Low, now);
        let critical = admit(&mut state, Priority::Critical, now);
        let normal = admit(&mut state, Priority::Normal, now);
        let high = admit(&mut state, Priority::High, now);

        assert_eq!(drain(&mut state), vec![critical, high, normal, low]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let first = admit(&mut state, Priority::Normal, now);
        let second = admit(&mut state, Priority::Normal, now);
        let third = admit(&mut state, Priority::Normal, now + ChronoDuration::milliseconds(5));

        assert_eq!(drain(&mut state), vec![first, second, third]);
    }

    #[test]
    fn test_fifo_survives_clock_step_back() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let first = admit(&mut state, Priority::Normal, now);
        let second = admit(&mut state, Priority::Normal, now - ChronoDuration::seconds(30));

        assert_eq!(drain(&mut state), vec![first, second]);
    }

    #[test]
    fn test_take_unhandled_leaves_other_jobs_queued() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let handled = admit(&mut state, Priority::Low, now);
        let orphan = JobRecord::new("unknown", json!(null), Priority::Critical, 3, now);
        let orphan_id = orphan.id.clone();
        state.admit(orphan, None, true);

        let taken = state.take_unhandled(|job_type| job_type == "echo");
        assert_eq!(taken, vec![(orphan_id.clone(), "unknown".to_string())]);
        assert_eq!(state.stats().pending, 1);

        assert!(state.reject(&orphan_id, &JobError::NoHandler("unknown".into()), now).is_some());
        assert_eq!(drain(&mut state), vec![handled]);
        assert!(state.take_unhandled(|_| false).is_empty());
    }

    #[test]
    fn test_requeued_job_keeps_creation_rank() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let older = admit(&mut state, Priority::Normal, now);
        let (id, _) = state.pop_ready().unwrap();
        assert_eq!(id, older);
        state.start(&older, now).unwrap();
        state.fail(&older, &JobError::failed("boom"), now).unwrap();

        let newer = admit(&mut state, Priority::Normal, now + ChronoDuration::seconds(1));
        assert!(state.make_ready(&older));

        assert_eq!(drain(&mut state), vec![older, newer]);
    }

    #[test]
    fn test_start_counts_attempts_and_keeps_first_start() {
        let t0 = Utc::now();
        let mut state = QueueState::new();
        let id = admit(&mut state, Priority::Normal, t0);

        state.pop_ready().unwrap();
        let started = state.start(&id, t0).unwrap();
        assert_eq!(started.record.status, JobStatus::Processing);
        assert_eq!(started.record.attempts, 1);

        state.fail(&id, &JobError::failed("boom"), t0).unwrap();
        state.make_ready(&id);
        state.pop_ready().unwrap();
        let t1 = t0 + ChronoDuration::seconds(2);
        let started = state.start(&id, t1).unwrap();
        assert_eq!(started.record.attempts, 2);
        assert_eq!(started.record.started_at, Some(t0));
    }

    #[test]
    fn test_fail_retries_until_exhausted() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let id = admit(&mut state, Priority::Normal, now);

        for attempt in 1..=2 {
            state.pop_ready().unwrap();
            state.start(&id, now).unwrap();
            let outcome = state.fail(&id, &JobError::failed(format!("e{attempt}")), now);
            assert!(matches!(outcome, Some(FailOutcome::Retry { attempts, .. }) if attempts == attempt));
            assert_eq!(state.get(&id).unwrap().status, JobStatus::Retrying);
            assert!(state.make_ready(&id));
        }

        state.pop_ready().unwrap();
        state.start(&id, now).unwrap();
        match state.fail(&id, &JobError::failed("e3"), now) {
            Some(FailOutcome::Failed(record)) => {
                assert_eq!(record.attempts, 3);
                assert_eq!(record.error.as_deref(), Some("e3"));
                assert_eq!(record.completed_at, Some(now));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unretryable_error_fails_immediately() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let id = admit(&mut state, Priority::Normal, now);
        state.pop_ready().unwrap();
        state.start(&id, now).unwrap();

        let outcome = state.fail(&id, &JobError::unrecoverable("gone"), now);
        assert!(matches!(outcome, Some(FailOutcome::Failed(_))));
        assert_eq!(state.get(&id).unwrap().attempts, 1);
    }

    #[test]
    fn test_reject_skips_processing() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let id = admit(&mut state, Priority::Normal, now);
        state.pop_ready().unwrap();

        let record = state
            .reject(&id, &JobError::NoHandler("echo".into()), now)
            .unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempts, 0);
        assert!(record.started_at.is_none());
    }

    #[test]
    fn test_record_lives_in_exactly_one_store() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let id = admit(&mut state, Priority::Normal, now);
        assert!(state.live.contains_key(&id) && !state.finished.contains_key(&id));

        state.pop_ready().unwrap();
        state.start(&id, now).unwrap();
        assert!(state.live.contains_key(&id) && !state.finished.contains_key(&id));

        state.complete(&id, json!(1), now).unwrap();
        assert!(!state.live.contains_key(&id) && state.finished.contains_key(&id));
    }

    #[test]
    fn test_stats_split_pending_and_delayed() {
        let now = Utc::now();
        let mut state = QueueState::new();
        admit(&mut state, Priority::Normal, now);
        let delayed = JobRecord::new("echo", json!(null), Priority::Normal, 3, now);
        let delayed_id = delayed.id.clone();
        state.admit(delayed, None, false);

        let stats = state.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.delayed, 1);
        assert_eq!(state.get(&delayed_id).unwrap().status, JobStatus::Pending);

        assert!(state.make_ready(&delayed_id));
        assert!(!state.make_ready(&delayed_id));
        assert_eq!(state.stats().pending, 2);
    }

    #[test]
    fn test_purge_only_touches_finished() {
        let now = Utc::now();
        let mut state = QueueState::new();
        let done = admit(&mut state, Priority::Normal, now);
        let waiting = admit(&mut state, Priority::Low, now);
        state.pop_ready().unwrap();
        state.start(&done, now).unwrap();
        state.complete(&done, json!("ok"), now).unwrap();

        assert_eq!(state.purge_finished_before(now - ChronoDuration::hours(1)), 0);
        assert!(state.get(&done).is_some());

        assert_eq!(state.purge_finished_before(now), 1);
        assert!(state.get(&done).is_none());
        assert!(state.get(&waiting).is_some());
    }
}
