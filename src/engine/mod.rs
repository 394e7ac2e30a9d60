// src/engine/mod.rs
//! Bindings to the queue engine that stores and delivers jobs.
//!
//! The typed layer only needs a narrow surface from an engine: open a queue
//! handle that can `add` and `close`, and start a worker that feeds each
//! delivered job to a [`JobProcessor`]. Persistence, retries, delays and
//! concurrency all live behind these traits.

pub mod memory;
pub mod redis;

use crate::{Job, JobOptions, QueueOptions, Result, WorkerOptions};
use serde_json::Value;
use std::sync::Arc;

/// Per-job callback run by an engine worker.
#[async_trait::async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, job: Job) -> Result<()>;
}

/// A connection to a queue engine.
#[async_trait::async_trait]
pub trait QueueEngine: Clone + Send + Sync + 'static {
    type Queue: QueueHandle;
    type Worker: WorkerHandle;

    /// Open a producer handle for `queue_name`.
    async fn open_queue(&self, queue_name: &str, options: &QueueOptions) -> Result<Self::Queue>;

    /// Start consuming `queue_name`, calling `processor` once per job.
    async fn start_worker(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        options: WorkerOptions,
    ) -> Result<Self::Worker>;
}

/// Producer side of a queue.
#[async_trait::async_trait]
pub trait QueueHandle: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Create one job, returning the engine's record of it.
    async fn add(&self, name: &str, data: Value, options: JobOptions) -> Result<Job>;

    async fn close(&self) -> Result<()>;
}

/// A running worker.
#[async_trait::async_trait]
pub trait WorkerHandle: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Stop taking new jobs and wait for in-flight ones, up to the
    /// configured shutdown timeout.
    async fn close(&self) -> Result<()>;
}
