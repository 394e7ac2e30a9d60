// src/engine/memory.rs
//! In-process engine.
//!
//! Jobs live in memory and are lost with the process. Retries happen
//! immediately, without backoff, until the job's `attempts` are used up.
//! Meant for tests and local development.

use super::{JobProcessor, QueueEngine, QueueHandle, WorkerHandle};
use crate::{Job, JobOptions, QueueOptions, Result, TypedQueueError, WorkerOptions};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct QueueState {
    waiting: Mutex<VecDeque<Job>>,
    completed: Mutex<Vec<Job>>,
    failed: Mutex<Vec<Job>>,
    added: AtomicUsize,
    // Jobs popped from `waiting` or sleeping on a delay.
    in_flight: AtomicUsize,
    notify: Notify,
}

impl QueueState {
    fn push(&self, job: Job) {
        lock(&self.waiting).push_back(job);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Job> {
        let mut waiting = lock(&self.waiting);
        let job = waiting.pop_front();
        if job.is_some() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        job
    }

    fn settle(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine keeping every queue in process memory.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    queues: Arc<Mutex<HashMap<String, Arc<QueueState>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, queue_name: &str) -> Arc<QueueState> {
        Arc::clone(lock(&self.queues).entry(queue_name.to_string()).or_default())
    }

    /// Number of jobs ever accepted by `add` on this queue.
    pub fn added_count(&self, queue_name: &str) -> usize {
        self.state(queue_name).added.load(Ordering::SeqCst)
    }

    pub fn waiting(&self, queue_name: &str) -> Vec<Job> {
        lock(&self.state(queue_name).waiting).iter().cloned().collect()
    }

    pub fn completed(&self, queue_name: &str) -> Vec<Job> {
        lock(&self.state(queue_name).completed).clone()
    }

    pub fn failed(&self, queue_name: &str) -> Vec<Job> {
        lock(&self.state(queue_name).failed).clone()
    }

    /// True when nothing is waiting, delayed or running on the queue.
    pub fn is_idle(&self, queue_name: &str) -> bool {
        let state = self.state(queue_name);
        let waiting = lock(&state.waiting);
        waiting.is_empty() && state.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Wait until the queue is idle, giving up after `limit`.
    pub async fn wait_idle(&self, queue_name: &str, limit: Duration) -> bool {
        timeout(limit, async {
            while !self.is_idle(queue_name) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait::async_trait]
impl QueueEngine for MemoryEngine {
    type Queue = MemoryQueue;
    type Worker = MemoryWorker;

    async fn open_queue(&self, queue_name: &str, _options: &QueueOptions) -> Result<MemoryQueue> {
        Ok(MemoryQueue {
            name: queue_name.to_string(),
            state: self.state(queue_name),
            closed: AtomicBool::new(false),
        })
    }

    async fn start_worker(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        options: WorkerOptions,
    ) -> Result<MemoryWorker> {
        Ok(MemoryWorker::spawn(self.state(queue_name), processor, options))
    }
}

/// Producer handle of a [`MemoryEngine`] queue.
pub struct MemoryQueue {
    name: String,
    state: Arc<QueueState>,
    closed: AtomicBool,
}

#[async_trait::async_trait]
impl QueueHandle for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, name: &str, data: Value, options: JobOptions) -> Result<Job> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TypedQueueError::Engine(format!(
                "queue '{}' is closed",
                self.name
            )));
        }

        let job = Job::new(&self.name, name, data, options);
        self.state.added.fetch_add(1, Ordering::SeqCst);

        match job.options.delay_secs {
            Some(delay) => {
                let state = Arc::clone(&self.state);
                let delayed = job.clone();
                state.in_flight.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    sleep(Duration::from_secs(delay)).await;
                    let mut delayed = delayed;
                    delayed.state = crate::JobState::Waiting;
                    state.push(delayed);
                    state.settle();
                });
            }
            None => self.state.push(job.clone()),
        }

        debug!(queue = %self.name, job_id = %job.id, job_name = name, "Job added");
        Ok(job)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Worker of a [`MemoryEngine`] queue.
pub struct MemoryWorker {
    id: String,
    concurrency: usize,
    shutdown_timeout: Duration,
    semaphore: Arc<Semaphore>,
    is_shutting_down: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryWorker {
    fn spawn(
        state: Arc<QueueState>,
        processor: Arc<dyn JobProcessor>,
        mut options: WorkerOptions,
    ) -> Self {
        options.concurrency = options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        let is_shutting_down = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(Self::run(
            state,
            processor,
            Arc::clone(&semaphore),
            Arc::clone(&is_shutting_down),
            Arc::clone(&shutdown),
            options.worker_id.clone(),
            options.poll_interval,
        ));

        info!(
            "Memory worker {} started with concurrency {}",
            options.worker_id, options.concurrency
        );

        Self {
            id: options.worker_id,
            concurrency: options.concurrency,
            shutdown_timeout: options.shutdown_timeout,
            semaphore,
            is_shutting_down,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    async fn run(
        state: Arc<QueueState>,
        processor: Arc<dyn JobProcessor>,
        semaphore: Arc<Semaphore>,
        is_shutting_down: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
        worker_id: String,
        poll_interval: Duration,
    ) {
        loop {
            // Registered before the flag check so a close in between still wakes us
            let stopped = shutdown.notified();
            tokio::pin!(stopped);
            stopped.as_mut().enable();

            if is_shutting_down.load(Ordering::SeqCst) {
                break;
            }

            let permit = tokio::select! {
                _ = stopped.as_mut() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if is_shutting_down.load(Ordering::SeqCst) {
                break;
            }

            match state.pop() {
                Some(job) => {
                    let state = Arc::clone(&state);
                    let processor = Arc::clone(&processor);
                    let worker_id = worker_id.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::execute(&state, processor.as_ref(), job, &worker_id).await;
                        state.settle();
                    });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        _ = state.notify.notified() => {}
                        _ = stopped.as_mut() => break,
                        _ = sleep(poll_interval) => {}
                    }
                }
            }
        }

        debug!("Memory worker {} loop terminated", worker_id);
    }

    #[instrument(skip_all, fields(job_id = %job.id, job_name = %job.name))]
    async fn execute(
        state: &QueueState,
        processor: &dyn JobProcessor,
        mut job: Job,
        worker_id: &str,
    ) {
        job.mark_active(worker_id);

        let result = match job.options.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), processor.process(job.clone()))
                .await
                .unwrap_or(Err(TypedQueueError::Timeout(secs))),
            None => processor.process(job.clone()).await,
        };

        match result {
            Ok(()) => {
                job.mark_completed();
                lock(&state.completed).push(job);
            }
            Err(e) => {
                job.mark_failed(e.to_string());
                if job.can_retry() {
                    warn!(attempt = job.attempts_made, "Job failed, retrying: {}", e);
                    state.push(job);
                } else {
                    error!(attempt = job.attempts_made, "Job failed: {}", e);
                    lock(&state.failed).push(job);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl WorkerHandle for MemoryWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<()> {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();

        let handle = lock(&self.handle).take();
        let drained = timeout(self.shutdown_timeout, async {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    error!("Memory worker {} loop panicked: {}", self.id, e);
                }
            }
            let _ = self.semaphore.acquire_many(self.concurrency as u32).await;
        })
        .await;
        if drained.is_err() {
            warn!(
                "Shutdown timeout reached, jobs may still be running on worker {}",
                self.id
            );
        }

        info!("Memory worker {} closed", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Flaky {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait::async_trait]
    impl JobProcessor for Flaky {
        async fn process(&self, _job: Job) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                Err(TypedQueueError::Engine(format!("attempt {} failed", n)))
            } else {
                Ok(())
            }
        }
    }

    struct Sleepy {
        calls: AtomicU32,
        duration: Duration,
    }

    #[async_trait::async_trait]
    impl JobProcessor for Sleepy {
        async fn process(&self, _job: Job) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.duration).await;
            Ok(())
        }
    }

    fn fast_worker() -> WorkerOptions {
        WorkerOptions::default()
            .with_concurrency(2)
            .with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn jobs_added_before_worker_are_delivered() {
        let engine = MemoryEngine::new();
        let queue = engine.open_queue("q", &QueueOptions::default()).await.unwrap();
        queue.add("a", Value::Null, JobOptions::default()).await.unwrap();

        let processor = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 0,
        });
        let worker = engine.start_worker("q", processor, fast_worker()).await.unwrap();

        assert!(engine.wait_idle("q", Duration::from_secs(2)).await);
        assert_eq!(engine.completed("q").len(), 1);
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_jobs_retry_until_attempts_run_out() {
        let engine = MemoryEngine::new();
        let queue = engine.open_queue("q", &QueueOptions::default()).await.unwrap();
        let processor = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 5,
        });
        let worker = engine
            .start_worker("q", Arc::clone(&processor) as Arc<dyn JobProcessor>, fast_worker())
            .await
            .unwrap();

        queue
            .add("a", Value::Null, JobOptions::default().with_attempts(3))
            .await
            .unwrap();

        assert!(engine.wait_idle("q", Duration::from_secs(2)).await);
        let failed = engine.failed("q");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts_made, 3);
        assert_eq!(failed[0].last_error.as_deref(), Some("Engine error: attempt 3 failed"));
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_gives_up_after_shutdown_timeout() {
        let engine = MemoryEngine::new();
        let queue = engine.open_queue("q", &QueueOptions::default()).await.unwrap();
        let processor = Arc::new(Sleepy {
            calls: AtomicU32::new(0),
            duration: Duration::from_secs(5),
        });
        let worker = engine
            .start_worker(
                "q",
                Arc::clone(&processor) as Arc<dyn JobProcessor>,
                fast_worker()
                    .with_concurrency(1)
                    .with_shutdown_timeout(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        queue
            .add("slow", Value::Null, JobOptions::default().with_timeout_secs(None))
            .await
            .unwrap();
        while processor.calls.load(Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(5)).await;
        }

        let started = std::time::Instant::now();
        worker.close().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_concurrency_still_runs_jobs() {
        let engine = MemoryEngine::new();
        let queue = engine.open_queue("q", &QueueOptions::default()).await.unwrap();
        let processor = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 0,
        });
        let options = WorkerOptions {
            concurrency: 0,
            ..fast_worker()
        };
        let worker = engine.start_worker("q", processor, options).await.unwrap();

        queue.add("a", Value::Null, JobOptions::default()).await.unwrap();

        assert!(engine.wait_idle("q", Duration::from_secs(2)).await);
        assert_eq!(engine.completed("q").len(), 1);
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn closed_queue_rejects_jobs() {
        let engine = MemoryEngine::new();
        let queue = engine.open_queue("q", &QueueOptions::default()).await.unwrap();
        queue.close().await.unwrap();

        let err = queue.add("a", Value::Null, JobOptions::default()).await.unwrap_err();
        assert!(matches!(err, TypedQueueError::Engine(_)));
        assert_eq!(engine.added_count("q"), 0);
    }
}
