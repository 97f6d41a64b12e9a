//! sockrpc Wire Messages
//!
//! Every frame on the wire is one [`Message`], a flat JSON object tagged by
//! its `type` field.
//!
//! # Message Flow
//!
//! ```text
//! responder                                  caller
//!     │ ── description { module } ───────────▶ │   once per connection
//!     │ ◀─────────── method call { id, .. } ── │
//!     │ ── method result { id, result } ─────▶ │   plain call
//!     │                                        │
//!     │ ◀─────────── method call { id, .. } ── │
//!     │ ── method start { id } ──────────────▶ │   streaming call
//!     │ ◀─────────── method next { id, args } ─│
//!     │ ── method result { id, result, done } ▶│   repeated until done
//! ```

use serde::{Deserialize, Serialize};

use super::error::{Result, RpcError};
use super::{Args, CallId, MethodName, Schema, Value};

/// The `type` tag of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Description,
    MethodCall,
    MethodResult,
    MethodStart,
    MethodNext,
}

impl MessageKind {
    /// The tag as it appears on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Description => "description",
            MessageKind::MethodCall => "method call",
            MessageKind::MethodResult => "method result",
            MessageKind::MethodStart => "method start",
            MessageKind::MethodNext => "method next",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message.
///
/// # Example
///
/// ```
/// use sockrpc_common::protocol::Message;
/// use serde_json::json;
///
/// let call = Message::call(7, "math.add", vec![json!(2), json!(3)]);
/// assert_eq!(
///     serde_json::to_value(&call).unwrap(),
///     json!({"type": "method call", "id": 7, "method": "math.add", "args": [2, 3]})
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    /// The schema of the responder's function collection.
    #[serde(rename = "description")]
    Description { module: Schema },

    /// Invoke the leaf at `method` with `args`.
    #[serde(rename = "method call")]
    MethodCall {
        id: CallId,
        method: MethodName,
        #[serde(default)]
        args: Args,
    },

    /// Outcome of a plain call, or of one step of a streaming call.
    #[serde(rename = "method result")]
    MethodResult(MethodResult),

    /// The generator behind a streaming call has been created.
    #[serde(rename = "method start")]
    MethodStart { id: CallId },

    /// Resume a streaming call, feeding `args` into the generator.
    #[serde(rename = "method next")]
    MethodNext {
        id: CallId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
}

/// Body of a `method result` message.
///
/// `result` and `error` are mutually exclusive. `done` is only present on
/// replies to a streaming call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodResult {
    pub id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl MethodResult {
    /// Whether this reply ends a streaming call.
    pub fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }

    /// Converts the reply into the caller-facing outcome.
    ///
    /// An `error` becomes [`RpcError::Remote`] carrying the remote message
    /// text; an absent `result` is `null`.
    pub fn into_outcome(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(RpcError::Remote(message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl Message {
    pub fn description(module: Schema) -> Self {
        Message::Description { module }
    }

    pub fn call(id: CallId, method: impl Into<MethodName>, args: Args) -> Self {
        Message::MethodCall {
            id,
            method: method.into(),
            args,
        }
    }

    /// Successful reply to a plain call.
    pub fn result(id: CallId, result: Value) -> Self {
        Message::MethodResult(MethodResult {
            id,
            result: Some(result),
            error: None,
            done: None,
        })
    }

    /// Failed reply; used for both plain calls and streaming steps.
    pub fn error(id: CallId, error: impl Into<String>) -> Self {
        Message::MethodResult(MethodResult {
            id,
            result: None,
            error: Some(error.into()),
            done: None,
        })
    }

    /// One step of a streaming call.
    pub fn step(id: CallId, result: Value, done: bool) -> Self {
        Message::MethodResult(MethodResult {
            id,
            result: Some(result),
            error: None,
            done: Some(done),
        })
    }

    pub fn start(id: CallId) -> Self {
        Message::MethodStart { id }
    }

    pub fn next(id: CallId, args: Option<Value>) -> Self {
        Message::MethodNext { id, args }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Description { .. } => MessageKind::Description,
            Message::MethodCall { .. } => MessageKind::MethodCall,
            Message::MethodResult(_) => MessageKind::MethodResult,
            Message::MethodStart { .. } => MessageKind::MethodStart,
            Message::MethodNext { .. } => MessageKind::MethodNext,
        }
    }

    /// The call id, for every message except `description`.
    pub fn id(&self) -> Option<CallId> {
        match self {
            Message::Description { .. } => None,
            Message::MethodCall { id, .. }
            | Message::MethodStart { id }
            | Message::MethodNext { id, .. } => Some(*id),
            Message::MethodResult(result) => Some(result.id),
        }
    }

    /// Parses a message out of an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
