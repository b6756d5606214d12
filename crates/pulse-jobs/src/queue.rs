//! The in-memory job queue.

use crate::clock::{Clock, SystemClock};
use crate::config::JobsConfig;
use crate::dispatcher;
use crate::error::{JobError, JobResult};
use crate::events::JobEvent;
use crate::job::{JobContext, JobId, JobPayload, JobRecord, JobStatus};
use crate::metrics::JobMetrics;
use crate::registry::HandlerRegistry;
use crate::retry::BackoffPolicy;
use crate::state::QueueState;
use crate::sweeper;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Notify, Semaphore};
use tracing::{debug, info, warn};

/// Job priority levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    /// Background work.
    Low = 1,
    /// Default.
    #[default]
    Normal = 2,
    /// Important work.
    High = 3,
    /// Time-sensitive work.
    Critical = 4,
}

impl Priority {
    /// Dispatch weight; higher runs first.
    pub fn weight(self) -> u8 {
        self as u8
    }

    /// Lowercase name, as used in config and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(JobError::Configuration(format!(
                "Unknown priority '{}'",
                other
            ))),
        }
    }
}

/// Per-job options for [`JobQueue::enqueue`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueOptions {
    /// Dispatch priority.
    pub priority: Priority,
    /// Attempt cap. Falls back to `JobsConfig::default_max_attempts`.
    pub max_attempts: Option<u32>,
    /// Hold the job back from dispatch for this long.
    pub delay: Option<Duration>,
    /// Handler time limit. Falls back to `JobsConfig::default_timeout_secs`.
    pub timeout: Option<Duration>,
}

impl EnqueueOptions {
    /// Options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the attempt cap.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set a start delay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a handler time limit.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Point-in-time job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting in the ready queue.
    pub pending: usize,
    /// Jobs whose handler is running.
    pub processing: usize,
    /// Finished successfully and not yet purged.
    pub completed: usize,
    /// Failed for good and not yet purged.
    pub failed: usize,
    /// Currently executing; equal to `processing`.
    pub active: usize,
    /// Waiting out a retry backoff.
    pub retrying: usize,
    /// Pending jobs still waiting out their start delay.
    pub delayed: usize,
}

/// State shared by the queue handle and its background tasks.
pub(crate) struct Shared {
    pub config: JobsConfig,
    pub backoff: BackoffPolicy,
    pub clock: Arc<dyn Clock>,
    pub handlers: HandlerRegistry,
    pub state: Mutex<QueueState>,
    pub wake: Notify,
    pub permits: Arc<Semaphore>,
    pub events: broadcast::Sender<JobEvent>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub runtime: Handle,
    stopped: AtomicBool,
}

impl Shared {
    pub fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.shutdown_tx.send(());
        true
    }

    pub fn record_sizes(&self, state: &QueueState) {
        let (pending, active) = state.gauges();
        JobMetrics::update_queue_sizes(pending, active);
    }

    pub fn purge_older_than(&self, window: Duration) -> usize {
        let now = self.clock.now();
        let Some(cutoff) = ChronoDuration::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return 0;
        };

        let removed = self.state.lock().purge_finished_before(cutoff);
        if removed > 0 {
            info!(removed, window_secs = window.as_secs(), "Purged finished jobs");
            JobMetrics::jobs_purged(removed);
        }
        removed
    }
}

/// Stops the background tasks once the last queue handle is dropped.
struct Lifetime(Arc<Shared>);

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// In-memory priority job queue with bounded concurrency and retries.
///
/// Cloning is cheap; clones share the same queue. Background tasks stop
/// when [`JobQueue::shutdown`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
    _lifetime: Arc<Lifetime>,
}

impl JobQueue {
    /// Create a queue and start its dispatcher and retention sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: JobsConfig) -> JobResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a queue that stamps records with `clock`.
    pub fn with_clock(config: JobsConfig, clock: Arc<dyn Clock>) -> JobResult<Self> {
        config.validate()?;
        if config.concurrency > Semaphore::MAX_PERMITS {
            return Err(JobError::Configuration(format!(
                "concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        let runtime = Handle::try_current().map_err(|_| {
            JobError::Configuration("JobQueue must be created inside a Tokio runtime".into())
        })?;

        let (events, _) = broadcast::channel(config.event_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            backoff: BackoffPolicy::from(&config.backoff),
            permits: Arc::new(Semaphore::new(config.concurrency)),
            clock,
            handlers: HandlerRegistry::new(),
            state: Mutex::new(QueueState::new()),
            wake: Notify::new(),
            events,
            shutdown_tx,
            runtime,
            stopped: AtomicBool::new(false),
            config,
        });

        let dispatcher_rx = shared.shutdown_tx.subscribe();
        shared
            .runtime
            .spawn(dispatcher::run(Arc::clone(&shared), dispatcher_rx));

        let sweeper_rx = shared.shutdown_tx.subscribe();
        shared
            .runtime
            .spawn(sweeper::run(Arc::clone(&shared), sweeper_rx));

        info!(
            concurrency = shared.config.concurrency,
            default_max_attempts = shared.config.default_max_attempts,
            retention_secs = shared.config.retention_secs,
            "Job queue started"
        );

        Ok(Self {
            _lifetime: Arc::new(Lifetime(Arc::clone(&shared))),
            shared,
        })
    }

    /// Bind an untyped handler to `job_type`. Re-registering replaces the
    /// previous handler.
    pub fn register_handler<F, Fut>(&self, job_type: impl Into<String>, handler: F)
    where
        F: Fn(Value, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<Value>> + Send + 'static,
    {
        self.shared.handlers.register(job_type, handler);
    }

    /// Bind a handler for the typed payload `P`.
    pub fn register<P, F, Fut>(&self, handler: F)
    where
        P: JobPayload,
        F: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<P::Output>> + Send + 'static,
    {
        self.shared.handlers.register_typed::<P, F, Fut>(handler);
    }

    /// Enqueue a typed payload.
    ///
    /// A payload that fails to serialize is still admitted, and is failed
    /// straight away with the serialization error.
    pub fn enqueue<P: JobPayload>(&self, payload: &P, options: EnqueueOptions) -> JobId {
        match serde_json::to_value(payload) {
            Ok(data) => self.admit(P::JOB_TYPE.to_string(), data, options, None),
            Err(err) => {
                warn!(job_type = P::JOB_TYPE, error = %err, "Failed to serialize job payload");
                self.admit(P::JOB_TYPE.to_string(), Value::Null, options, Some(err.into()))
            }
        }
    }

    /// Enqueue a job with an untyped payload.
    ///
    /// Always succeeds. Jobs whose type has no handler fail at dispatch.
    pub fn enqueue_raw(
        &self,
        job_type: impl Into<String>,
        data: Value,
        options: EnqueueOptions,
    ) -> JobId {
        self.admit(job_type.into(), data, options, None)
    }

    fn admit(
        &self,
        job_type: String,
        data: Value,
        options: EnqueueOptions,
        rejected: Option<JobError>,
    ) -> JobId {
        let shared = &self.shared;
        let now = shared.clock.now();

        let max_attempts = options
            .max_attempts
            .unwrap_or(shared.config.default_max_attempts);
        let record = JobRecord::new(job_type, data, options.priority, max_attempts, now);
        let id = record.id.clone();
        let job_type = record.job_type.clone();

        let delay = options.delay.filter(|delay| !delay.is_zero());
        let timeout = options.timeout.or_else(|| shared.config.default_timeout());
        let queued = delay.is_none() && rejected.is_none();

        JobMetrics::job_enqueued(&job_type, options.priority.as_str());

        {
            let mut state = shared.state.lock();
            state.admit(record, timeout, queued);
            shared.emit(JobEvent::Enqueued {
                job_id: id.clone(),
                job_type: job_type.clone(),
                priority: options.priority,
                delay,
            });

            if let Some(error) = rejected {
                if let Some(record) = state.reject(&id, &error, now) {
                    JobMetrics::job_failed(&job_type, error.kind(), Duration::ZERO);
                    shared.emit(JobEvent::Failed {
                        job_id: id.clone(),
                        job_type: job_type.clone(),
                        attempts: record.attempts,
                        error: error.to_string(),
                    });
                }
            }
            shared.record_sizes(&state);
        }

        debug!(
            job_id = %id,
            job_type = %job_type,
            priority = %options.priority,
            max_attempts,
            delay_ms = delay.map(|d| d.as_millis() as u64),
            "Job enqueued"
        );

        if let Some(delay) = delay {
            dispatcher::schedule_ready(shared, id.clone(), delay);
        } else if queued {
            shared.wake.notify_one();
        }

        id
    }

    /// Current record of a job, or `None` if the id is unknown or purged.
    pub fn get_status(&self, id: &JobId) -> Option<JobRecord> {
        self.shared.state.lock().get(id)
    }

    /// Current job counts.
    pub fn get_stats(&self) -> QueueStats {
        self.shared.state.lock().stats()
    }

    /// Remove finished jobs that completed at least `window` ago.
    ///
    /// Returns how many were removed. Live jobs are never touched.
    pub fn purge_older_than(&self, window: Duration) -> usize {
        self.shared.purge_older_than(window)
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until a job completes or fails.
    ///
    /// Returns `None` if the id is unknown. After [`JobQueue::shutdown`],
    /// returns the current record of any job that can no longer finish;
    /// a handler still running is waited for.
    pub async fn wait(&self, id: &JobId) -> Option<JobRecord> {
        let mut events = self.subscribe();
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();

        loop {
            let record = self.get_status(id)?;
            if record.is_terminal() {
                return Some(record);
            }
            if self.shared.is_stopped() && record.status != JobStatus::Processing {
                return Some(record);
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {}
                event = events.recv() => match event {
                    Ok(event) if event.job_id() == id => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(job_id = %id, skipped, "Event subscriber lagged");
                    }
                    Err(RecvError::Closed) => return self.get_status(id),
                },
            }
        }
    }

    /// Stop dispatching, cancel start-delay and backoff timers, and stop the
    /// retention sweeper. Handlers already running finish normally.
    pub fn shutdown(&self) {
        if self.shared.stop() {
            info!("Job queue shutting down");
        }
    }

    /// Returns true until [`JobQueue::shutdown`] is called.
    pub fn is_running(&self) -> bool {
        !self.shared.is_stopped()
    }

    /// Maximum number of jobs processing at once.
    pub fn concurrency(&self) -> usize {
        self.shared.config.concurrency
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        self.shared.handlers.job_types()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("concurrency", &self.shared.config.concurrency)
            .field("running", &self.is_running())
            .finish()
    }
}
