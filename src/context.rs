//! Context & Schema: the typed, schema-validated shared state a graph
//! executes against, plus the write-intercepting view nodes see.
//!
//! The context itself is a `serde_json::Value` object. A [`ContextSchema`]
//! validates it wholesale; the engine does not interpret the schema beyond
//! calling [`ContextSchema::validate`]. The default implementation,
//! [`JsonSchema`], wraps the `jsonschema` crate, the same crate the teacher
//! crate carries behind its `json-validation` feature — here it is load
//! bearing for the core, so it is not optional.
//!
//! Rust has no runtime property-write proxies, so change detection is
//! realized as design note (b) from the specification: [`ContextView`]
//! diffs old and new values at each `set` call and records a pending
//! [`StateChangePayload`] for the executor to emit.

use crate::error::{FlowError, Result};
use crate::event::StateChangePayload;
use serde_json::{Map, Value};
use std::fmt;

/// Validates a whole context value against some schema.
///
/// Implement this to substitute a hand-rolled validator for the default
/// `jsonschema`-backed one.
pub trait ContextSchema: Send + Sync {
    /// Validate `value` as a whole. On failure, return the first error
    /// message (full error bags are available from `jsonschema` but a
    /// single readable message is preferred, per the crate's error
    /// handling design).
    fn validate(&self, value: &Value) -> std::result::Result<(), String>;
}

/// A JSON Schema-backed [`ContextSchema`], built from a `serde_json::Value`
/// schema document.
pub struct JsonSchema {
    compiled: jsonschema::JSONSchema,
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema").finish_non_exhaustive()
    }
}

impl JsonSchema {
    /// Compile a JSON Schema document. Returns an error describing the first
    /// compilation failure.
    pub fn compile(schema: &Value) -> Result<Self> {
        let compiled = jsonschema::JSONSchema::compile(schema)
            .map_err(|e| FlowError::InitialContextInvalid(e.to_string()))?;
        Ok(JsonSchema { compiled })
    }
}

impl ContextSchema for JsonSchema {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        self.compiled
            .validate(value)
            .map_err(|mut errors| {
                errors
                    .next()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "schema validation failed".to_string())
            })
    }
}

/// A schema that accepts any context. Useful for tests and for graphs that
/// do not need structural validation.
#[derive(Debug, Default)]
pub struct PermissiveSchema;

impl ContextSchema for PermissiveSchema {
    fn validate(&self, _value: &Value) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// A write-intercepting view over a context object, handed to node bodies
/// in place of direct mutable access.
///
/// Each [`ContextView::set`] call compares the old and new values with
/// `serde_json::Value` equality; unchanged writes are no-ops, and changed
/// writes are recorded as a pending [`StateChangePayload`] (deduplicated
/// against the immediately preceding change to the same property) for the
/// executor to drain and emit after the call returns.
pub struct ContextView<'a> {
    node: String,
    object: &'a mut Map<String, Value>,
    pending: Vec<StateChangePayload>,
}

impl<'a> ContextView<'a> {
    pub(crate) fn new(node: impl Into<String>, object: &'a mut Map<String, Value>) -> Self {
        ContextView {
            node: node.into(),
            object,
            pending: Vec::new(),
        }
    }

    /// Read a property's current value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.object.get(key)
    }

    /// The whole context, as read at this moment.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.object.clone())
    }

    /// Write a property. Emits a pending state change iff the new value
    /// differs from the old one, per invariant 3, and iff it differs from
    /// the immediately preceding pending change to the same property, per
    /// invariant 5.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let old_value = self.object.get(&key).cloned();
        if old_value.as_ref() == Some(&value) {
            return;
        }
        if let Some(last) = self.pending.last() {
            if last.property == key && last.new_value == value {
                self.object.insert(key, value);
                return;
            }
        }
        self.object.insert(key.clone(), value.clone());
        self.pending.push(StateChangePayload {
            name: self.node.clone(),
            property: key,
            old_value,
            new_value: value,
            context: Value::Object(self.object.clone()),
        });
    }

    /// Merge a JSON object into the context, one `set` per key.
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (k, v) in patch {
            self.set(k.clone(), v.clone());
        }
    }

    /// Drain and return the pending state changes recorded so far.
    pub(crate) fn take_pending(&mut self) -> Vec<StateChangePayload> {
        std::mem::take(&mut self.pending)
    }
}

/// Parse and validate an initial context against a schema, returning the
/// underlying JSON object.
pub fn validate_initial(
    schema: &dyn ContextSchema,
    initial: Value,
) -> Result<Map<String, Value>> {
    schema
        .validate(&initial)
        .map_err(FlowError::InitialContextInvalid)?;
    match initial {
        Value::Object(map) => Ok(map),
        other => Err(FlowError::InitialContextInvalid(format!(
            "expected a JSON object as initial context, got {other}"
        ))),
    }
}
