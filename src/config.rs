// src/config.rs
use crate::JobOptions;
use std::time::Duration;

/// Connection settings for the Redis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "rbq".to_string(),
        }
    }
}

impl ConnectionOptions {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Default::default()
        }
    }

    /// Read `REDIS_URL` and `CHAINMQ_KEY_PREFIX`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("CHAINMQ_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Queue-level configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueOptions {
    /// Options applied by `add_job` when the caller passes none.
    pub default_job_options: JobOptions,
}

impl QueueOptions {
    pub fn with_default_job_options(mut self, options: JobOptions) -> Self {
        self.default_job_options = options;
        self
    }
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub delayed_check_interval: Duration,
    pub worker_id: String,
    pub shutdown_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_millis(100),
            delayed_check_interval: Duration::from_secs(5),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_delayed_check_interval(mut self, interval: Duration) -> Self {
        self.delayed_check_interval = interval;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
