//! Responder configuration.

use sockrpc_common::transport::TransportConfig;

/// Configuration for a [`Responder`](crate::Responder) and the servers
/// built on it.
///
/// # Fields
///
/// - `transport` - Applied to the transport of every accepted connection.
///   Accepted connections never reconnect, so only the message size limit
///   matters here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponderConfig {
    pub transport: TransportConfig,
}

impl ResponderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.transport.max_message_size = bytes;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.transport.validate()
    }
}
