// src/schema.rs
//! Payload schemas.
//!
//! A [`Schema`] checks an untyped JSON payload and returns its normalized
//! form, or the list of field-level problems it found. [`TypedSchema`] derives
//! one from any `serde` + `validator` type, [`FnSchema`] wraps a closure.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Validator for one job type's payload.
pub trait Schema: Send + Sync + 'static {
    /// Check `payload`, returning the normalized value on success.
    fn parse(&self, payload: &Value) -> Result<Value, SchemaIssues>;
}

/// A Rust type bound to a job name.
///
/// Implementing this on a payload struct lets the queue correlate the job
/// name and payload type at compile time:
/// [`SchemaMap::register`](crate::SchemaMap::register),
/// [`TypedQueue::add`](crate::TypedQueue::add) and
/// [`TypedQueue::handle_typed`](crate::TypedQueue::handle_typed) all key off
/// [`JobPayload::name`].
pub trait JobPayload: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    /// Job type name used for routing.
    fn name() -> &'static str;
}

/// A single problem found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    /// Dotted path to the offending field, empty for the payload root.
    pub path: String,
    /// Machine-readable code, e.g. `email` or `length`.
    pub code: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Issue attached to the whole payload rather than a field.
    pub fn root(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("", code, message)
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// All problems found while parsing one payload. Never empty when returned
/// from [`Schema::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaIssues(Vec<SchemaIssue>);

impl SchemaIssues {
    pub fn new(issues: Vec<SchemaIssue>) -> Self {
        Self(issues)
    }

    pub fn single(issue: SchemaIssue) -> Self {
        Self(vec![issue])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Issues reported for the given field path.
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a SchemaIssue> + 'a {
        self.0.iter().filter(move |issue| issue.path == path)
    }

    pub fn into_inner(self) -> Vec<SchemaIssue> {
        self.0
    }
}

impl fmt::Display for SchemaIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("invalid payload");
        }
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

impl From<ValidationErrors> for SchemaIssues {
    fn from(errors: ValidationErrors) -> Self {
        let mut issues = Vec::new();
        collect_issues("", &errors, &mut issues);
        issues.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.code.cmp(&b.code)));
        Self(issues)
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn collect_issues(prefix: &str, errors: &ValidationErrors, out: &mut Vec<SchemaIssue>) {
    for (field, kind) in errors.errors() {
        let path = join_path(prefix, &field.to_string());
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    out.push(SchemaIssue::new(
                        path.clone(),
                        error.code.to_string(),
                        describe(error),
                    ));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_issues(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_issues(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let param = |key: &str| error.params.get(key).map(|v| v.to_string());
    match error.code.as_ref() {
        "required" => "is required".to_string(),
        "email" => "must be a valid email address".to_string(),
        "url" => "must be a valid URL".to_string(),
        "length" => match (param("min"), param("max"), param("equal")) {
            (_, _, Some(equal)) => format!("length must be exactly {}", equal),
            (Some(min), Some(max), _) => format!("length must be between {} and {}", min, max),
            (Some(min), None, _) => format!("length must be at least {}", min),
            (None, Some(max), _) => format!("length must be at most {}", max),
            _ => "has invalid length".to_string(),
        },
        "range" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("must be between {} and {}", min, max),
            (Some(min), None) => format!("must be at least {}", min),
            (None, Some(max)) => format!("must be at most {}", max),
            _ => "is out of range".to_string(),
        },
        "regex" => "has an invalid format".to_string(),
        code => format!("failed validation: {}", code),
    }
}

/// Schema derived from a Rust type.
///
/// The payload is deserialized into `T`, checked with [`Validate`], and
/// serialized back, so the normalized value carries serde defaults and drops
/// unknown fields.
pub struct TypedSchema<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> TypedSchema<T>
where
    T: Serialize + DeserializeOwned + Validate,
{
    /// Parse straight into `T`, skipping the re-serialization step.
    pub fn parse_typed(&self, payload: &Value) -> Result<T, SchemaIssues> {
        let value: T = serde_json::from_value(payload.clone())
            .map_err(|e| SchemaIssues::single(SchemaIssue::root("type", e.to_string())))?;
        value.validate()?;
        Ok(value)
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: Serialize + DeserializeOwned + Validate + 'static,
{
    fn parse(&self, payload: &Value) -> Result<Value, SchemaIssues> {
        let value = self.parse_typed(payload)?;
        serde_json::to_value(&value)
            .map_err(|e| SchemaIssues::single(SchemaIssue::root("serialize", e.to_string())))
    }
}

/// Schema backed by a closure.
pub struct FnSchema<F> {
    f: F,
}

impl<F> FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, SchemaIssues> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, SchemaIssues> + Send + Sync + 'static,
{
    fn parse(&self, payload: &Value) -> Result<Value, SchemaIssues> {
        (self.f)(payload)
    }
}
