// src/queue.rs
use crate::engine::{JobProcessor, QueueEngine, QueueHandle, WorkerHandle};
use crate::{
    Dispatcher, HandlerRegistry, Job, JobHandler, JobOptions, JobPayload, QueueOptions, Result,
    SchemaMap, SchemaRegistry, TypedHandler, TypedQueueError, ValidationGate, WorkerOptions,
    handler_fn,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

/// Typed queue over a queue engine.
///
/// Owns one queue handle, opened at construction, and at most one worker,
/// created by [`start_worker`](Self::start_worker). Payloads are checked
/// against the schema of their job name before they are enqueued and again
/// before a handler sees them. Call [`close`](Self::close) to release both
/// handles; after that every operation returns [`TypedQueueError::Closed`].
pub struct TypedQueue<E: QueueEngine> {
    name: String,
    engine: E,
    options: QueueOptions,
    gate: ValidationGate,
    handlers: Arc<HandlerRegistry>,
    queue: E::Queue,
    worker: OnceCell<E::Worker>,
    lifecycle: Mutex<()>,
    closed: AtomicBool,
}

impl<E: QueueEngine> TypedQueue<E> {
    /// Open the queue `name` on `engine`.
    pub async fn new(
        name: impl Into<String>,
        schemas: SchemaMap,
        engine: E,
        options: QueueOptions,
    ) -> Result<Self> {
        let name = name.into();
        let queue = engine.open_queue(&name, &options).await?;
        let gate = ValidationGate::new(SchemaRegistry::new(schemas));

        info!(
            queue = %name,
            jobs = ?gate.schemas().job_names(),
            "Typed queue opened"
        );

        Ok(Self {
            name,
            engine,
            options,
            gate,
            handlers: Arc::new(HandlerRegistry::new()),
            queue,
            worker: OnceCell::new(),
            lifecycle: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying engine queue handle.
    pub fn queue(&self) -> &E::Queue {
        &self.queue
    }

    /// Underlying engine worker, once [`start_worker`](Self::start_worker) succeeded.
    pub fn worker(&self) -> Option<&E::Worker> {
        self.worker.get()
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        self.gate.schemas()
    }

    /// Job names with a registered handler, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.job_names()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TypedQueueError::Closed)
        } else {
            Ok(())
        }
    }

    /// Validate and enqueue a job with the queue's default options.
    pub async fn add_job(&self, name: &str, payload: Value) -> Result<Job> {
        self.add_job_with_options(name, payload, self.options.default_job_options.clone())
            .await
    }

    /// Validate and enqueue a job, forwarding `options` to the engine as is.
    ///
    /// Nothing reaches the engine unless the payload passes its schema; the
    /// engine receives the normalized payload.
    #[instrument(skip(self, payload, options), fields(queue = %self.name))]
    pub async fn add_job_with_options(
        &self,
        name: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<Job> {
        self.ensure_open()?;
        let data = self.gate.validate(name, &payload)?;
        let job = self.queue.add(name, data, options).await?;
        debug!(job_id = %job.id, "Job enqueued");
        Ok(job)
    }

    /// Enqueue a typed payload under its own job name.
    pub async fn add<T: JobPayload>(&self, payload: &T) -> Result<Job> {
        self.add_job(T::name(), serde_json::to_value(payload)?).await
    }

    /// Enqueue a typed payload with explicit options.
    pub async fn add_with_options<T: JobPayload>(
        &self,
        payload: &T,
        options: JobOptions,
    ) -> Result<Job> {
        self.add_job_with_options(T::name(), serde_json::to_value(payload)?, options)
            .await
    }

    /// Register the handler for job `name`, replacing any previous one.
    ///
    /// The name is not checked against the schemas; a handler without a
    /// schema makes its jobs fail with `UnknownJobType` at dispatch.
    pub fn register_handler(&self, name: impl Into<String>, handler: impl JobHandler) {
        let name = name.into();
        if self.handlers.register(name.clone(), Arc::new(handler)) {
            warn!(queue = %self.name, job_name = %name, "Replaced existing job handler");
        } else {
            debug!(queue = %self.name, job_name = %name, "Registered job handler");
        }
    }

    /// Register an async closure over the job record as handler for `name`.
    pub fn handle<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_handler(name, handler_fn(f));
    }

    /// Register a handler receiving the payload deserialized as `T`.
    pub fn handle_typed<T, F, Fut>(&self, f: F)
    where
        T: JobPayload,
        F: Fn(Job, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_handler(T::name(), TypedHandler::<T, F>::new(f));
    }

    /// Start the worker that routes delivered jobs to the handlers.
    ///
    /// Fails with `WorkerAlreadyStarted` if this queue already has one; the
    /// existing worker is left untouched.
    pub async fn start_worker(&self, options: WorkerOptions) -> Result<&E::Worker> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        if self.worker.initialized() {
            return Err(TypedQueueError::WorkerAlreadyStarted);
        }

        let processor: Arc<dyn JobProcessor> = Arc::new(self.dispatcher());
        let worker = self
            .engine
            .start_worker(&self.name, processor, options)
            .await?;

        info!(queue = %self.name, worker_id = %worker.id(), "Worker started");
        self.worker
            .set(worker)
            .map_err(|_| TypedQueueError::WorkerAlreadyStarted)?;
        self.worker.get().ok_or(TypedQueueError::WorkerNotInitialized)
    }

    /// The dispatcher a worker of this queue runs for every job.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.gate.clone(), Arc::clone(&self.handlers))
    }

    /// Close the worker, if any, then the queue handle.
    ///
    /// The queue handle is closed even when the worker fails to close; the
    /// worker's error is returned first.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TypedQueueError::Closed);
        }

        let worker_closed = match self.worker.get() {
            Some(worker) => worker.close().await,
            None => Ok(()),
        };
        let queue_closed = self.queue.close().await;
        if let Err(e) = &worker_closed {
            warn!(queue = %self.name, "Worker close failed: {}", e);
        }
        worker_closed?;
        queue_closed?;

        info!(queue = %self.name, "Typed queue closed");
        Ok(())
    }

    /// Block until SIGINT, SIGTERM or Ctrl-C, then [`close`](Self::close).
    pub async fn run_until_shutdown(&self) -> Result<()> {
        if self.worker.get().is_none() {
            return Err(TypedQueueError::WorkerNotInitialized);
        }

        wait_for_shutdown_signal().await?;
        info!(queue = %self.name, "Shutdown signal received");
        self.close().await
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| TypedQueueError::Engine(format!("SIGTERM handler: {}", e)))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| TypedQueueError::Engine(format!("SIGINT handler: {}", e)))?;

        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = sigint.recv() => info!("SIGINT received"),
            _ = signal::ctrl_c() => info!("CTRL+C received"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .map_err(|e| TypedQueueError::Engine(format!("CTRL+C handler: {}", e)))?;
        info!("CTRL+C received");
    }

    Ok(())
}

impl<E: QueueEngine> std::fmt::Debug for TypedQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedQueue")
            .field("name", &self.name)
            .field("schemas", self.gate.schemas())
            .field("handlers", &self.handlers)
            .field("worker", &self.worker.get().map(|w| w.id().to_string()))
            .field("closed", &self.is_closed())
            .finish()
    }
}
