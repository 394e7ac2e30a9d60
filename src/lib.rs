// src/lib.rs
//! chainmq-typed: typed job routing for a BullMQ-style job queue
//!
//! Each job name is bound to a payload schema. Payloads are validated before
//! they are enqueued and again before a handler runs, and delivered jobs are
//! routed to one handler per job name. Storage, delivery, retries and
//! concurrency belong to the queue engine (Redis, or in-memory for tests).
//!
//! ```rust,no_run
//! use chainmq_typed::{
//!     ConnectionOptions, JobPayload, QueueOptions, RedisEngine, SchemaMap, TypedQueue,
//!     WorkerOptions,
//! };
//! use serde::{Deserialize, Serialize};
//! use validator::Validate;
//!
//! #[derive(Serialize, Deserialize, Validate)]
//! struct SendEmail {
//!     #[validate(email)]
//!     to: String,
//!     subject: String,
//!     content: String,
//! }
//!
//! impl JobPayload for SendEmail {
//!     fn name() -> &'static str {
//!         "sendEmail"
//!     }
//! }
//!
//! # async fn run() -> chainmq_typed::Result<()> {
//! let engine = RedisEngine::connect(ConnectionOptions::from_env()).await?;
//! let queue = TypedQueue::new(
//!     "emails",
//!     SchemaMap::new().register::<SendEmail>(),
//!     engine,
//!     QueueOptions::default(),
//! )
//! .await?;
//!
//! queue.handle_typed(|_job, email: SendEmail| async move {
//!     println!("sending to {}", email.to);
//!     Ok(())
//! });
//! queue.start_worker(WorkerOptions::default()).await?;
//!
//! queue
//!     .add(&SendEmail {
//!         to: "a@b.com".into(),
//!         subject: "S".into(),
//!         content: "C".into(),
//!     })
//!     .await?;
//! queue.run_until_shutdown().await
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod factory;
pub mod handler;
pub mod job;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod validation;

pub use backoff::BackoffStrategy;
pub use config::{ConnectionOptions, QueueOptions, WorkerOptions};
pub use dispatch::Dispatcher;
pub use engine::memory::MemoryEngine;
pub use engine::redis::RedisEngine;
pub use engine::{JobProcessor, QueueEngine, QueueHandle, WorkerHandle};
pub use error::{Result, TypedQueueError};
pub use factory::{QueueFactory, create_typed_queue, queue_factory};
pub use handler::{FnHandler, JobHandler, TypedHandler, handler_fn};
pub use job::{Job, JobId, JobOptions, JobState};
pub use queue::TypedQueue;
pub use registry::{HandlerRegistry, SchemaMap, SchemaRegistry};
pub use schema::{FnSchema, JobPayload, Schema, SchemaIssue, SchemaIssues, TypedSchema};
pub use validation::ValidationGate;

// Re-export commonly used types
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use validator::Validate;
