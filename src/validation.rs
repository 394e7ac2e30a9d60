// src/validation.rs
use crate::{Result, SchemaRegistry, TypedQueueError};
use serde_json::Value;
use tracing::debug;

/// Checks payloads against the schema registered for their job name.
///
/// Used both before enqueue and before a handler runs. Pure: it only reads
/// the registry.
#[derive(Clone, Debug)]
pub struct ValidationGate {
    schemas: SchemaRegistry,
}

impl ValidationGate {
    pub fn new(schemas: SchemaRegistry) -> Self {
        Self { schemas }
    }

    /// Validate `payload` for job `name`, returning the normalized value.
    pub fn validate(&self, name: &str, payload: &Value) -> Result<Value> {
        let schema = self.schemas.get(name)?;
        schema.parse(payload).map_err(|issues| {
            debug!(job_name = name, %issues, "Payload rejected");
            TypedQueueError::Validation {
                job_name: name.to_string(),
                issues,
            }
        })
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnSchema, SchemaIssue, SchemaIssues, SchemaMap};
    use serde_json::json;

    fn gate() -> ValidationGate {
        let schemas = SchemaMap::new().insert(
            "count",
            FnSchema::new(|v: &Value| match v.get("n").and_then(Value::as_u64) {
                Some(n) => Ok(json!({ "n": n })),
                None => Err(SchemaIssues::single(SchemaIssue::new(
                    "n",
                    "type",
                    "expected an unsigned integer",
                ))),
            }),
        );
        ValidationGate::new(schemas.into())
    }

    #[test]
    fn returns_normalized_value() {
        let out = gate().validate("count", &json!({"n": 3, "junk": 1})).unwrap();
        assert_eq!(out, json!({"n": 3}));
    }

    #[test]
    fn failure_names_the_job_and_fields() {
        let err = gate().validate("count", &json!({"n": "x"})).unwrap_err();
        match err {
            TypedQueueError::Validation { job_name, issues } => {
                assert_eq!(job_name, "count");
                assert_eq!(issues.iter().next().unwrap().path, "n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = gate().validate("other", &json!({})).unwrap_err();
        assert!(matches!(err, TypedQueueError::UnknownJobType(name) if name == "other"));
    }
}
