//! WebSocket connections.
//!
//! Each protocol message travels as one text frame. Binary frames holding
//! UTF-8 are accepted; pings, pongs and close frames are handled by
//! `tokio-tungstenite` and never surface as messages.

use futures_util::{future, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::warn;

use crate::protocol::error::{Result, RpcError};

use super::connection::{BoxFuture, Connection, Connector};

/// Opens client WebSocket connections to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(async move {
            let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
            Ok(websocket_connection(ws))
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Performs the server side of the WebSocket handshake on an accepted
/// TCP stream.
pub async fn accept_websocket(stream: TcpStream) -> Result<Connection> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    Ok(websocket_connection(ws))
}

/// Adapts an established WebSocket to a text frame [`Connection`].
pub fn websocket_connection<S>(ws: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();

    let sink = sink.with(|text: String| future::ready(Ok::<_, RpcError>(WsMessage::Text(text))));

    let stream = stream.filter_map(|frame| {
        future::ready(match frame {
            Ok(WsMessage::Text(text)) => Some(Ok(text)),
            Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => Some(Ok(text)),
                Err(_) => {
                    warn!("Ignoring binary frame that is not UTF-8");
                    None
                }
            },
            Ok(_) => None,
            Err(e) => Some(Err(RpcError::from(e))),
        })
    });

    Connection::new(sink, stream)
}
