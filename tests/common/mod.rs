#![allow(dead_code)]

use chainmq_typed::{
    Job, JobOptions, JobPayload, JobProcessor, QueueEngine, QueueHandle, QueueOptions, Result,
    TypedQueueError, WorkerHandle, WorkerOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SendEmail {
    #[validate(email)]
    pub to: String,
    pub subject: String,
    pub content: String,
}

impl JobPayload for SendEmail {
    fn name() -> &'static str {
        "sendEmail"
    }
}

/// Engine double that records every call instead of storing jobs.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub events: Arc<Mutex<Vec<String>>>,
    pub added: Arc<Mutex<Vec<(String, Value, JobOptions)>>>,
    pub processors: Arc<Mutex<Vec<Arc<dyn JobProcessor>>>>,
    pub fail_add: bool,
    pub fail_worker_close: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_add: true,
            ..Self::default()
        }
    }

    pub fn failing_worker_close() -> Self {
        Self {
            fail_worker_close: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn added(&self) -> Vec<(String, Value, JobOptions)> {
        self.added.lock().unwrap().clone()
    }

    /// Deliver a job to the processor of the first started worker.
    pub async fn deliver(&self, name: &str, data: Value) -> Result<()> {
        let processor = Arc::clone(&self.processors.lock().unwrap()[0]);
        processor
            .process(Job::new("recorded", name, data, JobOptions::default()))
            .await
    }
}

pub struct RecordingQueue {
    name: String,
    engine: RecordingEngine,
}

pub struct RecordingWorker {
    id: String,
    engine: RecordingEngine,
}

impl std::fmt::Debug for RecordingWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingWorker").field("id", &self.id).finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl QueueEngine for RecordingEngine {
    type Queue = RecordingQueue;
    type Worker = RecordingWorker;

    async fn open_queue(
        &self,
        queue_name: &str,
        _options: &QueueOptions,
    ) -> Result<RecordingQueue> {
        self.events
            .lock()
            .unwrap()
            .push(format!("open_queue:{}", queue_name));
        Ok(RecordingQueue {
            name: queue_name.to_string(),
            engine: self.clone(),
        })
    }

    async fn start_worker(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        options: WorkerOptions,
    ) -> Result<RecordingWorker> {
        self.events
            .lock()
            .unwrap()
            .push(format!("start_worker:{}", queue_name));
        self.processors.lock().unwrap().push(processor);
        Ok(RecordingWorker {
            id: options.worker_id,
            engine: self.clone(),
        })
    }
}

#[async_trait::async_trait]
impl QueueHandle for RecordingQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, name: &str, data: Value, options: JobOptions) -> Result<Job> {
        if self.engine.fail_add {
            return Err(TypedQueueError::Engine("broker unavailable".to_string()));
        }
        self.engine
            .added
            .lock()
            .unwrap()
            .push((name.to_string(), data.clone(), options.clone()));
        Ok(Job::new(&self.name, name, data, options))
    }

    async fn close(&self) -> Result<()> {
        self.engine.events.lock().unwrap().push("close_queue".to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkerHandle for RecordingWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<()> {
        self.engine.events.lock().unwrap().push("close_worker".to_string());
        if self.engine.fail_worker_close {
            return Err(TypedQueueError::Engine("worker close failed".to_string()));
        }
        Ok(())
    }
}
