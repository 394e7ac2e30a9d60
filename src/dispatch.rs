// src/dispatch.rs
use crate::engine::JobProcessor;
use crate::{HandlerRegistry, Job, Result, TypedQueueError, ValidationGate};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-job callback handed to the engine's worker.
///
/// Each delivered job goes through three gates in order: handler lookup,
/// payload re-validation, handler call. The first failure is returned to the
/// engine and no later step runs.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    gate: ValidationGate,
    handlers: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(gate: ValidationGate, handlers: Arc<HandlerRegistry>) -> Self {
        Self { gate, handlers }
    }

    #[instrument(skip_all, fields(job_id = %job.id, job_name = %job.name))]
    pub async fn dispatch(&self, mut job: Job) -> Result<()> {
        let handler = self.handlers.lookup(&job.name).ok_or_else(|| {
            warn!("No handler registered");
            TypedQueueError::NoHandlerRegistered(job.name.clone())
        })?;

        job.data = self.gate.validate(&job.name, &job.data)?;

        debug!("Invoking handler");
        handler.handle(job).await.map_err(TypedQueueError::Handler)
    }
}

#[async_trait::async_trait]
impl JobProcessor for Dispatcher {
    async fn process(&self, job: Job) -> Result<()> {
        self.dispatch(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SchemaMap, TypedSchema, handler_fn};
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use validator::Validate;

    #[derive(Serialize, Deserialize, Validate)]
    struct Ping {
        #[validate(range(min = 1))]
        seq: u32,
        #[serde(default)]
        note: String,
    }

    fn dispatcher(seen: Arc<Mutex<Vec<Value>>>) -> Dispatcher {
        let gate = ValidationGate::new(
            SchemaMap::new()
                .insert("ping", TypedSchema::<Ping>::new())
                .into(),
        );
        let handlers = Arc::new(HandlerRegistry::new());
        handlers.register(
            "ping",
            Arc::new(handler_fn(move |job: Job| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(job.data);
                    Ok(())
                }
            })),
        );
        handlers.register(
            "orphan",
            Arc::new(handler_fn(|_job: Job| async { Ok(()) })),
        );
        Dispatcher::new(gate, handlers)
    }

    fn job(name: &str, data: Value) -> Job {
        Job::new("test", name, data, Default::default())
    }

    #[tokio::test]
    async fn valid_job_reaches_handler_normalized() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(Arc::clone(&seen));

        dispatcher.dispatch(job("ping", json!({"seq": 1}))).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!({"seq": 1, "note": ""})]);
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(Arc::clone(&seen));

        let err = dispatcher.dispatch(job("pong", json!({"seq": 1}))).await.unwrap_err();

        assert!(matches!(err, TypedQueueError::NoHandlerRegistered(name) if name == "pong"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(Arc::clone(&seen));

        let err = dispatcher.dispatch(job("ping", json!({"seq": 0}))).await.unwrap_err();

        assert!(matches!(err, TypedQueueError::Validation { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_without_schema_is_unknown_job_type() {
        let dispatcher = dispatcher(Arc::new(Mutex::new(Vec::new())));

        let err = dispatcher.dispatch(job("orphan", json!({}))).await.unwrap_err();

        assert!(matches!(err, TypedQueueError::UnknownJobType(name) if name == "orphan"));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let gate = ValidationGate::new(
            SchemaMap::new()
                .insert("ping", TypedSchema::<Ping>::new())
                .into(),
        );
        let handlers = Arc::new(HandlerRegistry::new());
        handlers.register(
            "ping",
            Arc::new(handler_fn(|_job: Job| async { Err(anyhow::anyhow!("smtp down")) })),
        );
        let dispatcher = Dispatcher::new(gate, handlers);

        let err = dispatcher.process(job("ping", json!({"seq": 2}))).await.unwrap_err();

        assert!(matches!(&err, TypedQueueError::Handler(e) if e.to_string() == "smtp down"));
    }
}
