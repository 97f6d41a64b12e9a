//! The duplex text-frame capability the transport wrapper drives.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::protocol::error::Result;
use crate::protocol::RpcError;

/// Boxed future returned by [`Connector::connect`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outgoing half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = RpcError> + Send>>;

/// Incoming half of a connection.
///
/// An `Err` item is a connection error; the end of the stream is a close.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One open duplex connection carrying discrete text messages.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = RpcError> + Send + 'static,
        St: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// A factory that opens new connections on demand.
///
/// Called on the first connect and again for every reconnection attempt.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<Connection>>;

    /// Human readable target, used in logs.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}
