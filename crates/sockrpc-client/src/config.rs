//! Client configuration.

use std::time::Duration;

use sockrpc_common::transport::TransportConfig;

/// Environment variable overriding the reconnect delay, in milliseconds.
pub const RECONNECT_DELAY_ENV: &str = "SOCKRPC_RECONNECT_DELAY_MS";

/// Configuration for a [`Client`](crate::Client).
///
/// # Fields
///
/// - `transport` - Reconnect delay and message size limit of the client's
///   transport.
/// - `description_timeout` - Upper bound on the wait for the server's
///   description after connecting. `None` (the default) waits forever,
///   retrying the connection every reconnect delay.
///
/// # Example
///
/// ```
/// use sockrpc_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_reconnect_delay(Duration::from_millis(500))
///     .with_description_timeout(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub description_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.transport.reconnect_delay = delay;
        self
    }

    pub fn with_description_timeout(mut self, timeout: Duration) -> Self {
        self.description_timeout = Some(timeout);
        self
    }

    /// Applies `SOCKRPC_RECONNECT_DELAY_MS` if it is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but is not a number of
    /// milliseconds.
    pub fn with_env_overrides(self) -> Result<Self, String> {
        match std::env::var(RECONNECT_DELAY_ENV) {
            Ok(raw) => self.with_reconnect_delay_override(&raw),
            Err(_) => Ok(self),
        }
    }

    fn with_reconnect_delay_override(self, raw: &str) -> Result<Self, String> {
        let millis: u64 = raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {} '{}': {}", RECONNECT_DELAY_ENV, raw, e))?;
        Ok(self.with_reconnect_delay(Duration::from_millis(millis)))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The transport configuration is invalid
    /// - The description timeout is zero
    pub fn validate(&self) -> Result<(), String> {
        self.transport.validate()?;

        if self.description_timeout == Some(Duration::ZERO) {
            return Err("description timeout must be greater than zero".to_string());
        }

        Ok(())
    }
}
