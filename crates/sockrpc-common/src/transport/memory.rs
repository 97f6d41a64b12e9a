//! In-process connections, for tests and embedding.

use tokio::sync::mpsc;

use crate::protocol::error::{Result, RpcError};

use super::connection::{BoxFuture, Connection, Connector};

/// Creates two connected in-memory connections.
///
/// Dropping either side's sink ends the other side's stream.
pub fn pair() -> (Connection, Connection) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();
    (half(left_tx, right_rx), half(right_tx, left_rx))
}

fn half(tx: mpsc::UnboundedSender<String>, rx: mpsc::UnboundedReceiver<String>) -> Connection {
    let sink = futures_util::sink::unfold(tx, |tx, text: String| async move {
        tx.send(text)
            .map_err(|_| RpcError::Connection("peer closed".to_string()))?;
        Ok::<_, RpcError>(tx)
    });
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|text| (Ok(text), rx))
    });
    Connection::new(sink, stream)
}

/// Connector whose connections are accepted by a paired [`MemoryListener`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<Connection>,
}

/// Receives the server halves of connections opened by a
/// [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<Connection>,
}

impl MemoryConnector {
    /// Creates a connector and the listener that accepts its connections.
    ///
    /// Connection attempts fail once the listener is dropped.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { incoming: tx }, MemoryListener { incoming: rx })
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(async move {
            let (client, server) = pair();
            self.incoming
                .send(server)
                .map_err(|_| RpcError::Connection("memory listener closed".to_string()))?;
            Ok(client)
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryListener {
    /// Waits for the next connection; `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<Connection> {
        self.incoming.recv().await
    }
}
