use std::str::FromStr;
use std::sync::Arc;

use sockrpc_common::protocol::{Args, Filter, Message, RpcError, Schema, Value};
use sockrpc_common::transport::{Connector, SocketTransport, TcpConnector, WebSocketConnector};
use sockrpc_common::Result;
use tracing::info;

use crate::config::ClientConfig;
use crate::generator::GeneratorCall;
use crate::proxy::ProxyModule;

/// Where a [`Client`] connects to.
///
/// Parsed from `ws://host:port/path` (WebSocket) or `tcp://host:port`
/// (length-prefixed TCP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    WebSocket(String),
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = RpcError;

    fn from_str(url: &str) -> Result<Self> {
        if url.starts_with("ws://") {
            Ok(Endpoint::WebSocket(url.to_string()))
        } else if let Some(addr) = url.strip_prefix("tcp://") {
            let addr = addr.trim_end_matches('/');
            if addr.is_empty() {
                return Err(RpcError::InvalidRequest(format!("missing address in '{}'", url)));
            }
            Ok(Endpoint::Tcp(addr.to_string()))
        } else {
            Err(RpcError::InvalidRequest(format!(
                "unsupported url '{}' (expected ws:// or tcp://)",
                url
            )))
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::WebSocket(url) => f.write_str(url),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// sockrpc client
///
/// Owns one [`SocketTransport`] and the proxy built from the server's
/// description. The transport reconnects on its own after a drop; calls in
/// flight keep waiting and messages sent meanwhile are queued.
///
/// Dropping the client (and every proxy cloned out of it) shuts the
/// transport down.
///
/// # Example
///
/// ```no_run
/// use sockrpc_client::Client;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> sockrpc_common::Result<()> {
/// let client = Client::connect_websocket("ws://127.0.0.1:8000/ws").await?;
///
/// let greeting = client.api().call("greet", vec![json!("world")]).await?;
/// assert_eq!(greeting, json!("Hello, world!"));
///
/// let sum = client.api().function("math.add")?.call(vec![json!(1), json!(2)]).await?;
/// assert_eq!(sum, json!(3));
/// # Ok(())
/// # }
/// ```
pub struct Client {
    transport: SocketTransport,
    schema: Arc<Schema>,
    api: ProxyModule,
}

impl Client {
    /// Connects through `connector`, waits for the server's description and
    /// builds the proxy.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - `description_timeout` elapses before the description arrives
    /// - The first message matching `description` is malformed
    pub async fn connect<C: Connector>(connector: C, config: ClientConfig) -> Result<Self> {
        config.validate().map_err(RpcError::InvalidRequest)?;

        let transport = SocketTransport::new(config.transport.clone());
        let description = transport.expect_one(Filter::description());
        transport.connect(connector)?;

        let value = match config.description_timeout {
            Some(timeout) => tokio::time::timeout(timeout, description)
                .await
                .map_err(|_| RpcError::Timeout(timeout.as_millis() as u64))??,
            None => description.await?,
        };

        let schema = match Message::from_value(value)? {
            Message::Description { module } => module,
            other => {
                return Err(RpcError::Protocol(format!(
                    "expected description, got {}",
                    other.kind()
                )))
            }
        };
        info!("Received description with {} methods", schema.leaves().len());

        let api = ProxyModule::build(&transport, &schema);
        Ok(Self {
            transport,
            schema: Arc::new(schema),
            api,
        })
    }

    /// Connects to a WebSocket URL with the default configuration.
    pub async fn connect_websocket(url: impl Into<String>) -> Result<Self> {
        Self::connect(WebSocketConnector::new(url), ClientConfig::default()).await
    }

    /// Connects to a `ws://` or `tcp://` URL.
    pub async fn connect_url(url: &str, config: ClientConfig) -> Result<Self> {
        match url.parse::<Endpoint>()? {
            Endpoint::WebSocket(url) => Self::connect(WebSocketConnector::new(url), config).await,
            Endpoint::Tcp(addr) => {
                let connector = TcpConnector::new(addr).with_max_message_size(config.transport.max_message_size);
                Self::connect(connector, config).await
            }
        }
    }

    /// The root of the proxy tree.
    pub fn api(&self) -> &ProxyModule {
        &self.api
    }

    /// The description received from the server.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn transport(&self) -> &SocketTransport {
        &self.transport
    }

    /// Shorthand for `api().call(path, args)`.
    pub async fn call(&self, path: &str, args: Args) -> Result<Value> {
        self.api.call(path, args).await
    }

    /// Shorthand for `api().stream(path, args)`.
    pub fn stream(&self, path: &str, args: Args) -> Result<GeneratorCall> {
        self.api.stream(path, args)
    }

    /// Shuts the transport down; pending calls fail with
    /// [`RpcError::Closed`].
    pub fn close(&self) {
        self.transport.shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("methods", &self.schema.leaves().len())
            .finish()
    }
}
