//! sockrpc Transport Layer
//!
//! This module wraps one duplex, message-oriented connection in a
//! [`SocketTransport`] that the client and responder build on.
//!
//! # Architecture
//!
//! - **Connection**: any pair of text frame sink and stream ([`Connection`]),
//!   opened on demand by a [`Connector`]
//! - **Codec**: JSON, one protocol message per frame
//! - **Routing**: inbound messages go to every listener whose [`Filter`]
//!   matches them, in registration order
//!
//! # Components
//!
//! - **[`SocketTransport`]**: queueing, listener dispatch and reconnection
//! - **[`WebSocketConnector`]** / **[`accept_websocket`]**: WebSocket text frames
//! - **[`TcpConnector`]** / **[`framed`]**: raw TCP, `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **[`memory::pair`]** / **[`MemoryConnector`]**: in-process connections
//!
//! # Message Size Limits
//!
//! Inbound frames above the configured maximum (100 MB by default) are
//! dropped before parsing.
//!
//! [`Filter`]: crate::protocol::Filter

pub mod codec;
pub mod config;
pub mod connection;
pub mod memory;
pub mod socket;
pub mod tcp;
pub mod websocket;

pub use codec::{JsonCodec, MAX_MESSAGE_SIZE};
pub use config::{TransportConfig, DEFAULT_RECONNECT_DELAY};
pub use connection::{BoxFuture, Connection, Connector, FrameSink, FrameStream};
pub use memory::{MemoryConnector, MemoryListener};
pub use socket::{Expectation, SocketTransport, Subscription};
pub use tcp::{framed, TcpConnector};
pub use websocket::{accept_websocket, websocket_connection, WebSocketConnector};
