//! Partial message shapes used to select incoming messages.

use serde_json::Map;

use super::{CallId, MessageKind, Value};

/// A partial message shape.
///
/// A message matches a filter iff every field present in the filter is
/// present in the message with an equal value. Nested objects are matched
/// recursively, so a filter only ever constrains the fields it names.
///
/// # Example
///
/// ```
/// use sockrpc_common::protocol::Filter;
/// use serde_json::json;
///
/// let filter = Filter::method_result(7);
/// assert!(filter.matches(&json!({"type": "method result", "id": 7, "result": "x"})));
/// assert!(!filter.matches(&json!({"type": "method result", "id": 8, "result": "x"})));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    /// A filter that matches every message.
    pub fn any() -> Self {
        Self { fields: Map::new() }
    }

    /// A filter on the message `type` tag.
    pub fn of_type(kind: MessageKind) -> Self {
        Self::any().with("type", kind.as_str())
    }

    /// Adds a required field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn description() -> Self {
        Self::of_type(MessageKind::Description)
    }

    /// Calls addressed to the leaf at `method`.
    pub fn method_call(method: &str) -> Self {
        Self::of_type(MessageKind::MethodCall).with("method", method)
    }

    pub fn method_result(id: CallId) -> Self {
        Self::of_type(MessageKind::MethodResult).with("id", id)
    }

    pub fn method_start(id: CallId) -> Self {
        Self::of_type(MessageKind::MethodStart).with("id", id)
    }

    pub fn method_next(id: CallId) -> Self {
        Self::of_type(MessageKind::MethodNext).with("id", id)
    }

    /// Tests `message` against this filter.
    pub fn matches(&self, message: &Value) -> bool {
        match message {
            Value::Object(object) => matches_object(&self.fields, object),
            _ => self.fields.is_empty(),
        }
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

fn matches_object(filter: &Map<String, Value>, object: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| match object.get(key) {
        Some(actual) => matches_value(expected, actual),
        None => false,
    })
}

fn matches_value(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => matches_object(expected, actual),
        (Value::Object(_), _) => false,
        (Value::Array(expected), Value::Array(actual)) => expected
            .iter()
            .enumerate()
            .all(|(index, item)| actual.get(index).is_some_and(|other| matches_value(item, other))),
        (Value::Array(_), _) => false,
        _ => expected == actual,
    }
}
