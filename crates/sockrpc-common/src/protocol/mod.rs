//! sockrpc Protocol Types
//!
//! The value domain, the five tagged wire messages, the partial-shape
//! [`Filter`] used to route incoming messages and the [`Schema`] descriptor
//! the responder sends once per connection.

pub mod error;
pub mod filter;
pub mod messages;
pub mod schema;


pub use error::{Result, RpcError};
pub use filter::Filter;
pub use messages::{Message, MessageKind, MethodResult};
pub use schema::{LeafKind, Schema, SchemaNode};

/// Any value that may cross the wire.
///
/// JSON values are trees, so the domain is closed under nesting and can
/// never contain cycles or functions.
pub type Value = serde_json::Value;

/// Ordered positional arguments of a call.
pub type Args = Vec<Value>;

/// Connection-scoped call identifier.
pub type CallId = u64;

/// Dot-joined path of a leaf in the schema tree (e.g. `math.add`).
pub type MethodName = String;
