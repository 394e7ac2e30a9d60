// src/engine/redis/queue.rs
use super::{Keys, due_at};
use crate::engine::QueueHandle;
use crate::{Job, JobId, JobOptions, Result, TypedQueueError};
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Producer handle for a Redis queue.
pub struct RedisQueue {
    name: String,
    con: MultiplexedConnection,
    keys: Keys,
    closed: AtomicBool,
}

impl RedisQueue {
    pub(crate) fn new(name: &str, con: MultiplexedConnection, keys: Keys) -> Self {
        Self {
            name: name.to_string(),
            con,
            keys,
            closed: AtomicBool::new(false),
        }
    }

    /// Get job by ID
    pub async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        load_job(&mut self.con.clone(), &self.keys, job_id).await
    }

    /// Get queue statistics
    pub async fn stats(&self) -> Result<QueueStats> {
        let mut con = self.con.clone();

        Ok(QueueStats {
            waiting: con.llen(self.keys.wait()).await?,
            active: con.scard(self.keys.active()).await?,
            delayed: con.zcard(self.keys.delayed()).await?,
            completed: con.llen(self.keys.completed()).await?,
            failed: con.llen(self.keys.failed()).await?,
        })
    }
}

#[async_trait::async_trait]
impl QueueHandle for RedisQueue {
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
        let metadata = serde_json::to_string(&job)?;
        let job_key = self.keys.job(&job.id);

        // Metadata and queue entry are written in one transaction
        let mut pipe = redis::pipe();
        pipe.atomic().hset(&job_key, "metadata", metadata).ignore();
        match job.options.delay_secs {
            Some(delay_secs) => {
                let execute_at = due_at(Utc::now().timestamp(), delay_secs);
                pipe.zadd(self.keys.delayed(), job.id.to_string(), execute_at)
                    .ignore();
            }
            None => {
                pipe.lpush(self.keys.wait(), job.id.to_string()).ignore();
            }
        }

        let mut con = self.con.clone();
        let _: () = pipe.query_async(&mut con).await?;

        debug!(queue = %self.name, job_id = %job.id, job_name = name, "Job added");
        Ok(job)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) async fn load_job(
    con: &mut MultiplexedConnection,
    keys: &Keys,
    job_id: &JobId,
) -> Result<Option<Job>> {
    let metadata: Option<String> = con.hget(keys.job(job_id), "metadata").await?;
    match metadata {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub(crate) async fn save_job(
    con: &mut MultiplexedConnection,
    keys: &Keys,
    job: &Job,
) -> Result<()> {
    let metadata = serde_json::to_string(job)?;
    let _: () = con.hset(keys.job(&job.id), "metadata", metadata).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
}
