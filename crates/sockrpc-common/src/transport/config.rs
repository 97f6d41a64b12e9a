//! Transport configuration.

use std::time::Duration;

use super::codec::MAX_MESSAGE_SIZE;

/// Default delay before a reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Configuration for a [`SocketTransport`](super::SocketTransport).
///
/// # Fields
///
/// - `reconnect_delay` - Fixed delay between a close/error and the next
///   connection attempt (default: 5 seconds). Only used when the transport
///   has a reconnection target.
/// - `max_message_size` - Largest inbound frame accepted (default: 100 MB).
///
/// # Example
///
/// ```
/// use sockrpc_common::transport::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig::new()
///     .with_reconnect_delay(Duration::from_millis(250));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub reconnect_delay: Duration,
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The maximum message size is zero
    /// - The maximum message size exceeds the codec limit (100 MB)
    pub fn validate(&self) -> Result<(), String> {
        if self.max_message_size == 0 {
            return Err("max message size must be greater than zero".to_string());
        }

        if self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(format!(
                "max message size must be <= {} bytes (got {})",
                MAX_MESSAGE_SIZE, self.max_message_size
            ));
        }

        Ok(())
    }
}
