// src/error.rs
use crate::schema::SchemaIssues;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypedQueueError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Validation failed for job '{job_name}': {issues}")]
    Validation {
        job_name: String,
        issues: SchemaIssues,
    },

    #[error("No handler registered for job: {0}")]
    NoHandlerRegistered(String),

    #[error("Worker already started")]
    WorkerAlreadyStarted,

    #[error("Worker not initialized")]
    WorkerNotInitialized,

    #[error("Queue is closed")]
    Closed,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl TypedQueueError {
    /// True for the errors raised by the validation gate.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::UnknownJobType(_) | Self::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, TypedQueueError>;
