//! Handler registry keyed by job type.

use crate::error::{JobError, JobResult};
use crate::job::{JobContext, JobPayload};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Type-erased job handler.
pub type JobHandler =
    Arc<dyn Fn(Value, JobContext) -> BoxFuture<'static, JobResult<Value>> + Send + Sync>;

/// Maps job types to handlers. Registering a type again replaces the
/// previous handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an untyped handler for `job_type`.
    pub fn register<F, Fut>(&self, job_type: impl Into<String>, handler: F)
    where
        F: Fn(Value, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<Value>> + Send + 'static,
    {
        let job_type = job_type.into();
        let handler_fn: JobHandler = Arc::new(move |data, ctx| handler(data, ctx).boxed());

        let replaced = self
            .handlers
            .write()
            .insert(job_type.clone(), handler_fn)
            .is_some();

        info!(job_type = %job_type, replaced, "Registered job handler");
    }

    /// Register a handler for a typed payload.
    ///
    /// The payload is decoded before the handler runs; a payload that does
    /// not match `P` fails the job without retrying.
    pub fn register_typed<P, F, Fut>(&self, handler: F)
    where
        P: JobPayload,
        F: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<P::Output>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(P::JOB_TYPE, move |data, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let payload: P = serde_json::from_value(data)?;
                let output = (*handler)(payload, ctx).await?;
                let value = serde_json::to_value(output)?;
                Ok::<Value, JobError>(value)
            }
        });
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<JobHandler> {
        self.handlers.read().get(job_type).cloned()
    }

    /// Returns true if a handler is registered for `job_type`.
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }
}
