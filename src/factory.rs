// src/factory.rs
use crate::engine::QueueEngine;
use crate::{QueueOptions, Result, SchemaMap, TypedQueue};

/// Open a typed queue in one call.
pub async fn create_typed_queue<E: QueueEngine>(
    name: impl Into<String>,
    schemas: SchemaMap,
    engine: E,
    options: QueueOptions,
) -> Result<TypedQueue<E>> {
    TypedQueue::new(name, schemas, engine, options).await
}

/// Creates typed queues sharing one engine connection and queue options.
#[derive(Debug, Clone)]
pub struct QueueFactory<E: QueueEngine> {
    engine: E,
    options: QueueOptions,
}

impl<E: QueueEngine> QueueFactory<E> {
    pub fn new(engine: E, options: QueueOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn create(
        &self,
        name: impl Into<String>,
        schemas: SchemaMap,
    ) -> Result<TypedQueue<E>> {
        TypedQueue::new(name, schemas, self.engine.clone(), self.options.clone()).await
    }
}

/// Bind `engine` and `options` once for creating several queues.
pub fn queue_factory<E: QueueEngine>(engine: E, options: QueueOptions) -> QueueFactory<E> {
    QueueFactory::new(engine, options)
}
