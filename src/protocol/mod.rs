//! Client-server communication protocol.
//!
//! This module defines the FlyDB binary wire protocol: the fixed message header,
//! the message type taxonomy, payload serialization, and the transport that moves
//! framed messages over a byte stream.
//!
//! # Binary Format
//!
//! Every message starts with a fixed 8 byte header followed by the payload:
//!
//! ```text
//! offset 0: magic     (1 byte, 0xFD)
//! offset 1: version   (1 byte, 0x01)
//! offset 2: msg_type  (1 byte, see [`MessageType`])
//! offset 3: flags     (1 byte, see [`MessageFlags`])
//! offset 4: length    (4 bytes, big-endian payload length)
//! offset 8: payload   (`length` bytes of JSON object text)
//! ```
//!
//! Headers are decoded before any payload byte is read, so a bad magic byte,
//! an unsupported version or an oversize length is rejected up front and the
//! transport always issues exactly two bounded reads per message.
//!
//! # Key Components
//!
//! - [`Message`]: a message type plus its JSON payload.
//! - [`codec`]: stateless header and message encoding.
//! - [`ProtocolTransport`]: exact-length framed I/O over a stream (e.g. TCP).
//!
//! # See Also
//!
//! - [`Connection`](crate::Connection): drives request/response exchanges over a transport.
pub mod codec;
mod message;
mod transport;

pub use codec::{
    HEADER_SIZE, MAGIC_BYTE, MAX_MESSAGE_SIZE, MessageHeader, PROTOCOL_VERSION, ProtocolError,
};
pub use message::{Message, MessageFlags, MessageType, MetadataFilter, Payload, TxOptions};
pub use transport::{FrameError, ProtocolTransport, TransportError};
