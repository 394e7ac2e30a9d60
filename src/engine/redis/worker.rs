// src/engine/redis/worker.rs
use super::{Keys, due_at};
use super::lua::LuaScripts;
use super::queue::{load_job, save_job};
use crate::engine::{JobProcessor, WorkerHandle};
use crate::{Job, JobId, Result, TypedQueueError, WorkerOptions};
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{Notify, Semaphore},
    task::JoinHandle,
    time::{Duration, interval, timeout},
};
use tracing::{error, info, instrument, warn};

/// Shared state of the polling loops and job tasks.
struct WorkerCore {
    con: MultiplexedConnection,
    keys: Keys,
    scripts: LuaScripts,
    processor: Arc<dyn JobProcessor>,
    worker_id: String,
}

/// Job worker polling one Redis queue
pub struct RedisWorker {
    options: WorkerOptions,
    semaphore: Arc<Semaphore>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    is_shutting_down: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl RedisWorker {
    pub(crate) fn spawn(
        con: MultiplexedConnection,
        keys: Keys,
        processor: Arc<dyn JobProcessor>,
        mut options: WorkerOptions,
    ) -> Self {
        options.concurrency = options.concurrency.max(1);
        info!(
            "Starting worker {} with concurrency {}",
            options.worker_id, options.concurrency
        );

        let core = Arc::new(WorkerCore {
            con,
            keys,
            scripts: LuaScripts::new(),
            processor,
            worker_id: options.worker_id.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        let is_shutting_down = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let handles = vec![
            Self::spawn_worker_loop(
                Arc::clone(&core),
                Arc::clone(&semaphore),
                Arc::clone(&is_shutting_down),
                Arc::clone(&shutdown),
                options.poll_interval,
            ),
            Self::spawn_delayed_processor(
                Arc::clone(&core),
                Arc::clone(&is_shutting_down),
                Arc::clone(&shutdown),
                options.delayed_check_interval,
            ),
        ];

        Self {
            options,
            semaphore,
            handles: Mutex::new(handles),
            is_shutting_down,
            shutdown,
        }
    }

    /// Number of jobs currently executing on this worker.
    pub fn active_jobs(&self) -> usize {
        self.options.concurrency - self.semaphore.available_permits()
    }

    /// The loop only stops between claims. A claimed id is always handed to
    /// `execute_job`, so shutdown never strands it in the active set.
    fn spawn_worker_loop(
        core: Arc<WorkerCore>,
        semaphore: Arc<Semaphore>,
        is_shutting_down: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = interval(poll_interval);

            loop {
                let stopped = shutdown.notified();
                tokio::pin!(stopped);
                stopped.as_mut().enable();

                if is_shutting_down.load(Ordering::SeqCst) {
                    info!("Worker loop stopping - shutdown initiated");
                    break;
                }

                // Wait for a free slot before claiming so claimed jobs never queue up locally
                let permit = tokio::select! {
                    _ = stopped.as_mut() => break,
                    permit = async {
                        interval.tick().await;
                        Arc::clone(&semaphore).acquire_owned().await
                    } => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            error!("Failed to acquire semaphore permit");
                            break;
                        }
                    },
                };
                if is_shutting_down.load(Ordering::SeqCst) {
                    break;
                }

                match core.claim_job().await {
                    Ok(Some(job_id)) => {
                        let core = Arc::clone(&core);
                        tokio::spawn(async move {
                            let _permit = permit;

                            if let Err(e) = core.execute_job(job_id).await {
                                error!("Job execution failed: {}", e);
                            }
                        });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to claim job: {}", e);
                        tokio::select! {
                            _ = stopped.as_mut() => break,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                    }
                }
            }

            info!("Worker loop terminated");
        })
    }

    fn spawn_delayed_processor(
        core: Arc<WorkerCore>,
        is_shutting_down: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
        check_interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = interval(check_interval);

            loop {
                let stopped = shutdown.notified();
                tokio::pin!(stopped);
                stopped.as_mut().enable();

                if is_shutting_down.load(Ordering::SeqCst) {
                    info!("Delayed processor stopping");
                    break;
                }

                tokio::select! {
                    _ = stopped.as_mut() => break,
                    _ = interval.tick() => {}
                }

                match core.process_delayed().await {
                    Ok(moved) if moved > 0 => info!("Moved {} delayed jobs to waiting", moved),
                    Ok(_) => {}
                    Err(e) => error!("Failed to process delayed jobs: {}", e),
                }
            }
        })
    }
}

impl WorkerCore {
    async fn claim_job(&self) -> Result<Option<JobId>> {
        let mut con = self.con.clone();
        let claimed: Option<String> = self
            .scripts
            .claim_job
            .key(self.keys.wait())
            .key(self.keys.active())
            .invoke_async(&mut con)
            .await?;

        claimed
            .map(|id| {
                id.parse()
                    .map_err(|_| TypedQueueError::Engine(format!("Invalid job ID format: {}", id)))
            })
            .transpose()
    }

    async fn process_delayed(&self) -> Result<usize> {
        let mut con = self.con.clone();
        let moved: i64 = self
            .scripts
            .move_delayed
            .key(self.keys.delayed())
            .key(self.keys.wait())
            .arg(Utc::now().timestamp())
            .invoke_async(&mut con)
            .await?;

        Ok(moved.max(0) as usize)
    }

    #[instrument(skip_all, fields(job_id = %job_id))]
    async fn execute_job(&self, job_id: JobId) -> Result<()> {
        let start_time = std::time::Instant::now();
        let mut con = self.con.clone();

        let mut job = match self.activate(&mut con, &job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.release(&mut con, &job_id, &e).await?;
                return Err(e);
            }
        };

        let result = match job.options.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), self.processor.process(job.clone()))
                .await
                .unwrap_or(Err(TypedQueueError::Timeout(secs))),
            None => self.processor.process(job.clone()).await,
        };

        let execution_time = start_time.elapsed();
        let id = job_id.to_string();
        let mut pipe = redis::pipe();
        pipe.atomic().srem(self.keys.active(), &id).ignore();

        match result {
            Ok(()) => {
                job.mark_completed();
                pipe.lpush(self.keys.completed(), &id).ignore();
                info!("Job {} completed successfully in {:?}", job_id, execution_time);
            }
            Err(e) => {
                job.mark_failed(e.to_string());
                if job.can_retry() {
                    let delay = job.options.backoff.delay_for(job.attempts_made);
                    let execute_at = due_at(Utc::now().timestamp(), delay.as_secs());
                    pipe.zadd(self.keys.delayed(), &id, execute_at).ignore();
                    warn!(
                        "Job {} failed (attempt {}), retrying in {:?}: {}",
                        job_id, job.attempts_made, delay, e
                    );
                } else {
                    pipe.lpush(self.keys.failed(), &id).ignore();
                    error!(
                        "Job {} failed after {} attempts: {}",
                        job_id, job.attempts_made, e
                    );
                }
            }
        }

        pipe.hset(self.keys.job(&job_id), "metadata", serde_json::to_string(&job)?)
            .ignore();
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }

    async fn activate(
        &self,
        con: &mut MultiplexedConnection,
        job_id: &JobId,
    ) -> Result<Option<Job>> {
        let Some(mut job) = load_job(con, &self.keys, job_id).await? else {
            error!("Job {} not found", job_id);
            let _: () = con.srem(self.keys.active(), job_id.to_string()).await?;
            return Ok(None);
        };

        job.mark_active(&self.worker_id);
        save_job(con, &self.keys, &job).await?;
        Ok(Some(job))
    }

    /// Take a claimed job that never reached the processor out of the active
    /// set. Unreadable metadata goes to the failed list, anything else back to
    /// the head of the wait list.
    async fn release(
        &self,
        con: &mut MultiplexedConnection,
        job_id: &JobId,
        cause: &TypedQueueError,
    ) -> Result<()> {
        let id = job_id.to_string();
        let mut pipe = redis::pipe();
        pipe.atomic().srem(self.keys.active(), &id).ignore();

        if matches!(cause, TypedQueueError::Serialization(_)) {
            pipe.lpush(self.keys.failed(), &id).ignore();
            error!("Job {} has unreadable metadata, moved to failed: {}", job_id, cause);
        } else {
            pipe.rpush(self.keys.wait(), &id).ignore();
            warn!("Job {} could not be started, requeued: {}", job_id, cause);
        }

        let _: () = pipe.query_async(con).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkerHandle for RedisWorker {
    fn id(&self) -> &str {
        &self.options.worker_id
    }

    /// Perform graceful shutdown
    async fn close(&self) -> Result<()> {
        info!(
            "Initiating graceful shutdown for worker {}",
            self.options.worker_id
        );

        // Stop claiming new jobs; the polling tasks exit at their next wait point
        self.is_shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let active = self.active_jobs();
        if active > 0 {
            info!("Waiting for {} active jobs to complete...", active);
        }

        let drained = timeout(self.options.shutdown_timeout, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Worker task panicked: {}", e);
                }
            }
            let _ = self
                .semaphore
                .acquire_many(self.options.concurrency as u32)
                .await;
        })
        .await;
        match drained {
            Ok(()) => info!("All jobs completed successfully during shutdown"),
            Err(_) => warn!(
                "Shutdown timeout reached. {} jobs may still be running",
                self.active_jobs()
            ),
        }

        info!("Worker {} shutdown complete", self.options.worker_id);
        Ok(())
    }
}
