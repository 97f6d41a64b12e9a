//! sockrpc Common Types and Transport
//!
//! This crate provides the wire protocol and the message transport shared by
//! the sockrpc responder and client.
//!
//! # Overview
//!
//! sockrpc exposes a tree of named functions and generators over a single
//! duplex connection. The responder describes its tree once per connection;
//! the client turns that description into a proxy and calls through it.
//! This crate contains the parts both ends need:
//!
//! - **Protocol Layer**: the five tagged messages, filters, the schema
//!   descriptor and error handling
//! - **Transport Layer**: the socket wrapper with its outbound queue,
//!   filter-routed listeners and reconnection
//!
//! # Architecture
//!
//! - **Transport**: WebSocket text frames, raw TCP or in-memory channels
//! - **Serialization**: JSON, one message per frame
//! - **Routing**: partial-shape filters on the decoded message
//! - **Max Message Size**: 100 MB
//!
//! # Components
//!
//! - [`protocol`] - Messages, filters, schema and errors
//! - [`transport`] - The socket wrapper and concrete connections
//!
//! # Example
//!
//! ```
//! use sockrpc_common::{Filter, Message};
//! use serde_json::json;
//!
//! let call = Message::call(0, "math.add", vec![json!(2), json!(3)]);
//! let reply = Message::result(0, json!(5));
//!
//! assert!(Filter::method_call("math.add").matches(&call.to_value().unwrap()));
//! assert!(Filter::method_result(0).matches(&reply.to_value().unwrap()));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
