// src/handler.rs
use crate::{Job, JobPayload};
use std::future::Future;
use std::marker::PhantomData;

/// Handler invoked with a validated job record.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job) -> anyhow::Result<()>;
}

/// Handler backed by an async closure over the job record.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure as a [`JobHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait::async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, job: Job) -> anyhow::Result<()> {
        (self.f)(job).await
    }
}

/// Handler that deserializes the payload into `T` before calling the closure.
pub struct TypedHandler<T, F> {
    f: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F, Fut> TypedHandler<T, F>
where
    T: JobPayload,
    F: Fn(Job, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T, F, Fut> JobHandler for TypedHandler<T, F>
where
    T: JobPayload,
    F: Fn(Job, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, job: Job) -> anyhow::Result<()> {
        let payload: T = serde_json::from_value(job.data.clone())?;
        (self.f)(job, payload).await
    }
}
