use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::protocol::error::{Result, RpcError};

use super::codec::MAX_MESSAGE_SIZE;
use super::connection::{BoxFuture, Connection, Connector};

/// Raw TCP connector.
///
/// Frames carry one JSON message each, with a length prefix:
///
/// ```text
/// [4-byte length as u32 big-endian] [UTF-8 JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use sockrpc_common::transport::{SocketTransport, TcpConnector, TransportConfig};
///
/// # #[tokio::main]
/// # async fn main() -> sockrpc_common::Result<()> {
/// let transport = SocketTransport::new(TransportConfig::default());
/// transport.connect(TcpConnector::new("127.0.0.1:9000"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    max_message_size: usize,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Resolves the address and tries each candidate until one accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address cannot be resolved
    /// - Connection fails to all resolved addresses
    async fn open(&self) -> Result<TcpStream> {
        let socket_addrs = tokio::net::lookup_host(self.addr.as_str())
            .await
            .map_err(|e| RpcError::Connection(format!("Invalid address '{}': {}", self.addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(socket_addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(RpcError::Connection(format!(
            "Failed to connect to {}: {}",
            self.addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(async move {
            let stream = self.open().await?;
            Ok(framed(stream, self.max_message_size))
        })
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Wraps an open TCP stream as a length-prefixed frame connection.
///
/// Frames larger than `max_message_size` fail the connection, since the
/// stream cannot be resynchronised without reading them.
pub fn framed(stream: TcpStream, max_message_size: usize) -> Connection {
    let (reader, writer) = stream.into_split();

    let sink = futures_util::sink::unfold(writer, |mut writer, text: String| async move {
        write_frame(&mut writer, text.as_bytes()).await?;
        Ok::<_, RpcError>(writer)
    });

    let stream = futures_util::stream::unfold(Some(reader), move |reader| async move {
        let mut reader = reader?;
        match read_frame(&mut reader, max_message_size).await {
            Ok(Some(text)) => Some((Ok(text), Some(reader))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });

    Connection::new(sink, stream)
}

/// Wire format: `[4-byte length as u32 big-endian] + [data]`
async fn write_frame(writer: &mut OwnedWriteHalf, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| RpcError::Protocol(format!("Message too large: {} bytes", data.len())))?;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| map_io_error(e, "writing data"))?;
    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one frame; `Ok(None)` on a clean close between frames.
async fn read_frame(reader: &mut OwnedReadHalf, max_message_size: usize) -> Result<Option<String>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(map_io_error(e, "reading length prefix")),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_message_size {
        return Err(RpcError::Protocol(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, max_message_size
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading data"))?;

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| RpcError::Protocol(format!("Frame is not valid UTF-8: {}", e)))
}

fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => RpcError::Connection(format!("{}: Connection lost", context)),
        _ => RpcError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_frames_cross_the_socket_in_order() {
        let (client, server) = connected_pair().await;
        let mut client = framed(client, MAX_MESSAGE_SIZE);
        let mut server = framed(server, MAX_MESSAGE_SIZE);

        client.sink.send("first".to_string()).await.unwrap();
        client.sink.send("{\"n\":2}".to_string()).await.unwrap();

        assert_eq!(server.stream.next().await.unwrap().unwrap(), "first");
        assert_eq!(server.stream.next().await.unwrap().unwrap(), "{\"n\":2}");
    }

    #[tokio::test]
    async fn test_peer_close_ends_stream() {
        let (client, server) = connected_pair().await;
        let mut server = framed(server, MAX_MESSAGE_SIZE);
        drop(client);

        assert!(server.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_fails_connection() {
        let (mut client, server) = connected_pair().await;
        let mut server = framed(server, 8);

        client.write_all(&64u32.to_be_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let err = server.stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Message too large"));
        assert!(server.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_connector_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = TcpConnector::new(addr.to_string());
        assert_eq!(connector.describe(), format!("tcp://{}", addr));
        assert!(connector.connect().await.is_err());
    }
}
