use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Message, Value};

/// Maximum frame size accepted from the wire (100 MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// JSON codec for protocol messages
///
/// Frames are UTF-8 JSON text, one message per frame. Inbound frames are
/// decoded to a raw value so filters can match them before they are typed.
///
/// # Example
///
/// ```
/// use sockrpc_common::transport::JsonCodec;
/// use sockrpc_common::protocol::Message;
///
/// let text = JsonCodec::encode(&Message::start(1)).unwrap();
/// let value = JsonCodec::decode_value(&text).unwrap();
/// assert_eq!(Message::from_value(value).unwrap(), Message::start(1));
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode(message: &Message) -> Result<String> {
        Ok(serde_json::to_string(message)?)
    }

    /// Decode a frame without interpreting it
    ///
    /// Frames larger than [`MAX_MESSAGE_SIZE`] are rejected before parsing.
    pub fn decode_value(text: &str) -> Result<Value> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(RpcError::Protocol(format!(
                "Message too large: {} bytes (max {} bytes)",
                text.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(serde_json::from_str(text)?)
    }
}
