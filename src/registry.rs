// src/registry.rs
use crate::{JobHandler, JobPayload, Result, Schema, TypedQueueError, TypedSchema};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Job name to schema mapping supplied when a queue is built.
#[derive(Default, Clone)]
pub struct SchemaMap {
    schemas: HashMap<String, Arc<dyn Schema>>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema under an explicit job name.
    pub fn insert(mut self, name: impl Into<String>, schema: impl Schema) -> Self {
        self.schemas.insert(name.into(), Arc::new(schema));
        self
    }

    /// Add the schema for a payload type under its own job name.
    pub fn register<T: JobPayload>(self) -> Self {
        self.insert(T::name(), TypedSchema::<T>::new())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl std::fmt::Debug for SchemaMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.schemas.keys()).finish()
    }
}

/// Read-only view of a [`SchemaMap`], shared between producer and dispatch.
#[derive(Clone)]
pub struct SchemaRegistry {
    schemas: Arc<HashMap<String, Arc<dyn Schema>>>,
}

impl SchemaRegistry {
    pub fn new(map: SchemaMap) -> Self {
        Self {
            schemas: Arc::new(map.schemas),
        }
    }

    /// Schema for `name`, or `UnknownJobType`.
    pub fn get(&self, name: &str) -> Result<&dyn Schema> {
        self.schemas
            .get(name)
            .map(|schema| schema.as_ref())
            .ok_or_else(|| TypedQueueError::UnknownJobType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }
}

impl From<SchemaMap> for SchemaRegistry {
    fn from(map: SchemaMap) -> Self {
        Self::new(map)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("jobs", &self.job_names())
            .finish()
    }
}

/// Per-queue job handlers, one per job name.
///
/// Registering a name again replaces the previous handler. Lookups clone the
/// handler `Arc` out of a short read lock, so a dispatch in flight keeps the
/// handler it started with.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under `name`, returning true when it replaced one.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), handler)
            .is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("jobs", &self.job_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnSchema, Job, handler_fn};
    use serde_json::{Value, json};

    fn passthrough() -> impl Schema {
        FnSchema::new(|v: &Value| Ok(v.clone()))
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let registry = SchemaRegistry::new(SchemaMap::new().insert("known", passthrough()));

        assert!(registry.get("known").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(TypedQueueError::UnknownJobType(name)) if name == "missing"
        ));
    }

    #[test]
    fn schema_registry_clones_share_entries() {
        let registry = SchemaRegistry::new(
            SchemaMap::new()
                .insert("b", passthrough())
                .insert("a", passthrough()),
        );
        let clone = registry.clone();
        assert_eq!(clone.job_names(), vec!["a", "b"]);
        assert!(Arc::ptr_eq(&registry.schemas, &clone.schemas));
    }

    #[tokio::test]
    async fn later_registration_replaces_handler() {
        let registry = HandlerRegistry::new();
        let first = registry.register(
            "job",
            Arc::new(handler_fn(|_job: Job| async { Err(anyhow::anyhow!("first")) })),
        );
        let replaced = registry.register("job", Arc::new(handler_fn(|_job: Job| async { Ok(()) })));
        assert!(!first);
        assert!(replaced);

        let handler = registry.lookup("job").unwrap();
        let job = Job::new("q", "job", json!({}), Default::default());
        assert!(handler.handle(job).await.is_ok());
    }

    #[test]
    fn missing_handler_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup("nothing").is_none());
        assert!(!registry.contains("nothing"));
    }
}
