// src/job.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Current state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

/// Per-job options, passed through to the engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    pub delay_secs: Option<u64>,
    pub attempts: u32,
    pub backoff: crate::backoff::BackoffStrategy,
    pub timeout_secs: Option<u64>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay_secs: None,
            attempts: 3,
            backoff: crate::backoff::BackoffStrategy::Exponential { base: 2, cap: 300 },
            timeout_secs: Some(300), // 5 minutes default
        }
    }
}

impl JobOptions {
    pub fn with_delay_secs(mut self, delay_secs: u64) -> Self {
        self.delay_secs = Some(delay_secs);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: crate::backoff::BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Job record owned by the engine.
///
/// Handlers receive this record with `data` replaced by the validated,
/// normalized payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub queue_name: String,
    pub data: Value,
    pub options: JobOptions,
    pub state: JobState,
    pub attempts_made: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
}

impl Job {
    /// A fresh job as an engine records it on enqueue.
    pub fn new(
        queue_name: impl Into<String>,
        name: impl Into<String>,
        data: Value,
        options: JobOptions,
    ) -> Self {
        let state = if options.delay_secs.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };

        Self {
            id: JobId::new(),
            name: name.into(),
            queue_name: queue_name.into(),
            data,
            options,
            state,
            attempts_made: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            last_error: None,
            worker_id: None,
        }
    }

    /// Whether another attempt is allowed after the current one failed.
    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.options.attempts
    }

    pub fn mark_active(&mut self, worker_id: &str) {
        self.state = JobState::Active;
        self.started_at = Some(Utc::now());
        self.worker_id = Some(worker_id.to_string());
    }

    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed attempt. The state becomes `Delayed` when a retry is
    /// still allowed, `Failed` otherwise.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.attempts_made += 1;
        self.last_error = Some(error.into());
        self.failed_at = Some(Utc::now());
        self.state = if self.can_retry() {
            JobState::Delayed
        } else {
            JobState::Failed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delayed_jobs_start_in_delayed_state() {
        let job = Job::new("q", "a", json!({}), JobOptions::default().with_delay_secs(10));
        assert_eq!(job.state, JobState::Delayed);

        let job = Job::new("q", "a", json!({}), JobOptions::default());
        assert_eq!(job.state, JobState::Waiting);
    }

    #[test]
    fn failures_exhaust_attempts() {
        let mut job = Job::new("q", "a", json!({}), JobOptions::default().with_attempts(2));

        job.mark_failed("boom");
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.attempts_made, 1);

        job.mark_failed("boom again");
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
