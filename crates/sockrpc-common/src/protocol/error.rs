use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The remote function or generator failed; carries its message text.
    #[error("{0}")]
    Remote(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("'{path}' is a {actual}, not a {expected}")]
    WrongLeafKind {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Transport closed")]
    Closed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RpcError::WebSocket(err.to_string())
    }
}

impl From<std::net::AddrParseError> for RpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        RpcError::InvalidRequest(err.to_string())
    }
}

impl RpcError {
    /// Returns the message text carried by a remote invocation fault.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            RpcError::Remote(message) => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
