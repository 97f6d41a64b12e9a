//! Listening servers
//!
//! Both servers accept TCP connections and hand each one to a
//! [`Responder`] on its own task:
//!
//! - [`WebSocketServer`] performs the WebSocket upgrade first. Requests that
//!   are not upgrades fail the handshake and are dropped.
//! - [`TcpServer`] speaks length-prefixed JSON frames directly.
//!
//! # Example
//!
//! ```no_run
//! use sockrpc_server::{Module, WebSocketServer};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> sockrpc_common::Result<()> {
//!     let module = Module::new().sync_function("ping", |_| Ok(json!("pong")));
//!     let server = WebSocketServer::bind("127.0.0.1:8000", module).await?;
//!     server.run().await
//! }
//! ```

use std::net::SocketAddr;

use sockrpc_common::protocol::error::{Result, RpcError};
use sockrpc_common::transport::{accept_websocket, framed};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::config::ResponderConfig;
use crate::module::Module;
use crate::responder::Responder;

async fn bind_listener(addr: impl ToSocketAddrs) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RpcError::Transport(format!("Failed to bind: {}", e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| RpcError::Transport(format!("Failed to get local address: {}", e)))?;
    Ok((listener, local_addr))
}

async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr)> {
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| RpcError::Transport(format!("Failed to accept connection: {}", e)))?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }
    Ok((stream, peer))
}

/// WebSocket server for a [`Module`].
pub struct WebSocketServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    responder: Responder,
}

impl WebSocketServer {
    /// Binds to `addr`; port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs, module: Module) -> Result<Self> {
        let (listener, local_addr) = bind_listener(addr).await?;
        Ok(Self {
            listener,
            local_addr,
            responder: Responder::new(module),
        })
    }

    pub fn with_config(mut self, config: ResponderConfig) -> Self {
        self.responder = self.responder.with_config(config);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until accepting fails.
    pub async fn run(self) -> Result<()> {
        info!("WebSocket server listening on {}", self.local_addr);

        loop {
            let (stream, peer) = accept(&self.listener).await?;
            let responder = self.responder.clone();

            tokio::spawn(async move {
                match accept_websocket(stream).await {
                    Ok(connection) => {
                        info!("Accepted WebSocket connection from {}", peer);
                        responder.serve_connection(connection).await;
                        info!("Connection from {} closed", peer);
                    }
                    Err(e) => warn!("Rejected connection from {}: {}", peer, e),
                }
            });
        }
    }
}

/// Length-prefixed TCP server for a [`Module`].
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    responder: Responder,
}

impl TcpServer {
    /// Binds to `addr`; port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs, module: Module) -> Result<Self> {
        let (listener, local_addr) = bind_listener(addr).await?;
        Ok(Self {
            listener,
            local_addr,
            responder: Responder::new(module),
        })
    }

    pub fn with_config(mut self, config: ResponderConfig) -> Self {
        self.responder = self.responder.with_config(config);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until accepting fails.
    pub async fn run(self) -> Result<()> {
        info!("TCP server listening on {}", self.local_addr);

        loop {
            let (stream, peer) = accept(&self.listener).await?;
            let responder = self.responder.clone();
            let max_message_size = responder.config().transport.max_message_size;

            tokio::spawn(async move {
                info!("Accepted TCP connection from {}", peer);
                responder.serve_connection(framed(stream, max_message_size)).await;
                info!("Connection from {} closed", peer);
            });
        }
    }
}
