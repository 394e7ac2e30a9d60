// src/engine/redis/mod.rs
//! Redis-backed engine.
//!
//! Each job is stored as JSON under `{prefix}:job:{id}`. Per queue, ids move
//! between a `wait` list, an `active` set, a `delayed` sorted set scored by
//! due time, and the `completed` / `failed` lists.

mod lua;
mod queue;
mod worker;

pub use queue::{QueueStats, RedisQueue};
pub use worker::RedisWorker;

use super::{JobProcessor, QueueEngine};
use crate::{ConnectionOptions, JobId, QueueOptions, Result, WorkerOptions};
use redis::Client as RedisClient;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use tracing::info;

/// Connection to a Redis server used as the queue engine.
#[derive(Clone)]
pub struct RedisEngine {
    client: RedisClient,
    con: MultiplexedConnection,
    options: ConnectionOptions,
}

impl RedisEngine {
    pub async fn connect(options: ConnectionOptions) -> Result<Self> {
        let client = RedisClient::open(options.redis_url.as_str())?;
        let con = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis at {}", options.redis_url);

        Ok(Self {
            client,
            con,
            options,
        })
    }

    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn keys(&self, queue_name: &str) -> Keys {
        Keys::new(&self.options.key_prefix, queue_name)
    }
}

impl std::fmt::Debug for RedisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEngine")
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait::async_trait]
impl QueueEngine for RedisEngine {
    type Queue = RedisQueue;
    type Worker = RedisWorker;

    async fn open_queue(&self, queue_name: &str, _options: &QueueOptions) -> Result<RedisQueue> {
        Ok(RedisQueue::new(queue_name, self.con.clone(), self.keys(queue_name)))
    }

    async fn start_worker(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        options: WorkerOptions,
    ) -> Result<RedisWorker> {
        Ok(RedisWorker::spawn(
            self.con.clone(),
            self.keys(queue_name),
            processor,
            options,
        ))
    }
}

/// Unix timestamp `delay_secs` from `now`, saturating instead of wrapping.
pub(crate) fn due_at(now: i64, delay_secs: u64) -> i64 {
    now.saturating_add(i64::try_from(delay_secs).unwrap_or(i64::MAX))
}

/// Key names for one queue.
#[derive(Debug, Clone)]
pub(crate) struct Keys {
    prefix: String,
    queue: String,
}

impl Keys {
    pub fn new(prefix: &str, queue: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            queue: queue.to_string(),
        }
    }

    pub fn job(&self, job_id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    pub fn wait(&self) -> String {
        format!("{}:queue:{}:wait", self.prefix, self.queue)
    }

    pub fn active(&self) -> String {
        format!("{}:queue:{}:active", self.prefix, self.queue)
    }

    pub fn delayed(&self) -> String {
        format!("{}:queue:{}:delayed", self.prefix, self.queue)
    }

    pub fn completed(&self) -> String {
        format!("{}:queue:{}:completed", self.prefix, self.queue)
    }

    pub fn failed(&self) -> String {
        format!("{}:queue:{}:failed", self.prefix, self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn keys_are_namespaced_by_prefix_and_queue() {
        let keys = Keys::new("rbq", "emails");
        let id = JobId(Uuid::nil());

        assert_eq!(keys.job(&id), "rbq:job:00000000-0000-0000-0000-000000000000");
        assert_eq!(keys.wait(), "rbq:queue:emails:wait");
        assert_eq!(keys.active(), "rbq:queue:emails:active");
        assert_eq!(keys.delayed(), "rbq:queue:emails:delayed");
        assert_eq!(keys.completed(), "rbq:queue:emails:completed");
        assert_eq!(keys.failed(), "rbq:queue:emails:failed");
    }

    #[test]
    fn huge_delays_saturate_instead_of_wrapping() {
        assert_eq!(due_at(1_000, 60), 1_060);
        assert_eq!(due_at(1_000, u64::MAX), i64::MAX);
        assert_eq!(due_at(1_000, i64::MAX as u64), i64::MAX);
    }
}
