use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
};
use thiserror::Error;

use super::{Message, MessageFlags, MessageType, Payload};

/// Identifies a FlyDB frame.
pub const MAGIC_BYTE: u8 = 0xFD;
/// The single supported protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;
pub const HEADER_SIZE: usize = 8;
/// Upper bound for a payload, checked on both encode and decode.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid header size: {0} bytes, expected {HEADER_SIZE}")]
    ShortHeader(usize),
    #[error("invalid magic byte: 0x{0:02X}, expected 0x{MAGIC_BYTE:02X}")]
    BadMagic(u8),
    #[error("unsupported protocol version: 0x{0:02X}, expected 0x{PROTOCOL_VERSION:02X}")]
    UnsupportedVersion(u8),
    #[error("message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    TooLarge(usize),
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),
    #[error("unknown message flags: 0x{0:02X}")]
    UnknownFlags(u8),
    #[error("payload length {declared} does not match {actual} bytes received")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("failed to encode header: {0}")]
    HeaderEncode(#[from] bincode::error::EncodeError),
    #[error("failed to decode header: {0}")]
    HeaderDecode(#[from] bincode::error::DecodeError),
    #[error("failed to encode message: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to decode message: {0}")]
    Deserialize(serde_json::Error),
}

/// On-wire layout of the fixed header; integers are big-endian.
#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct RawHeader {
    magic: u8,
    version: u8,
    msg_type: u8,
    flags: u8,
    length: u32,
}

/// A validated message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub msg_type: MessageType,
    pub flags: MessageFlags,
    pub length: usize,
}

fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

pub fn encode_header(
    msg_type: MessageType,
    length: usize,
    flags: MessageFlags,
) -> Result<[u8; HEADER_SIZE], ProtocolError> {
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(length));
    }

    let raw = RawHeader {
        magic: MAGIC_BYTE,
        version: PROTOCOL_VERSION,
        msg_type: msg_type.into(),
        flags: flags.bits(),
        length: length as u32,
    };
    let mut buf = [0u8; HEADER_SIZE];
    bincode::encode_into_slice(raw, &mut buf, config())?;
    Ok(buf)
}

/// Decodes and validates the first [`HEADER_SIZE`] bytes of `bytes`.
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::ShortHeader(bytes.len()));
    }

    let (raw, _): (RawHeader, usize) = bincode::decode_from_slice(&bytes[..HEADER_SIZE], config())?;

    if raw.magic != MAGIC_BYTE {
        return Err(ProtocolError::BadMagic(raw.magic));
    }
    if raw.version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(raw.version));
    }
    let length = raw.length as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(length));
    }

    Ok(MessageHeader {
        msg_type: raw.msg_type.try_into()?,
        flags: raw.flags.try_into()?,
        length,
    })
}

/// Frames `payload` behind a header. An empty payload is sent as zero bytes.
pub fn encode_message(msg_type: MessageType, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
    let body = if payload.is_empty() {
        Vec::new()
    } else {
        serde_json::to_vec(payload).map_err(ProtocolError::Serialize)?
    };

    let header = encode_header(msg_type, body.len(), MessageFlags::NONE)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&body);
    Ok(buf)
}

pub fn decode_message(header: MessageHeader, payload: &[u8]) -> Result<Message, ProtocolError> {
    if payload.len() != header.length {
        return Err(ProtocolError::LengthMismatch {
            declared: header.length,
            actual: payload.len(),
        });
    }

    let payload = if payload.is_empty() {
        Payload::new()
    } else {
        serde_json::from_slice(payload).map_err(ProtocolError::Deserialize)?
    };

    Ok(Message {
        msg_type: header.msg_type,
        flags: header.flags,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: serde_json::Value) -> Payload {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn header_layout() {
        let bytes = encode_header(MessageType::Query, 0x0102, MessageFlags::NONE).unwrap();
        assert_eq!(bytes, [0xFD, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn header_round_trip() {
        let cases = [
            (MessageType::Ping, 0, MessageFlags::NONE),
            (MessageType::QueryResult, 42, MessageFlags::COMPRESSED),
            (
                MessageType::SessionResult,
                MAX_MESSAGE_SIZE,
                MessageFlags::COMPRESSED | MessageFlags::ENCRYPTED,
            ),
        ];

        for (msg_type, length, flags) in cases {
            let bytes = encode_header(msg_type, length, flags).unwrap();
            let header = decode_header(&bytes).unwrap();
            assert_eq!(
                header,
                MessageHeader {
                    msg_type,
                    flags,
                    length
                }
            );
        }
    }

    #[test]
    #[should_panic(expected = "TooLarge")]
    fn encode_header_rejects_oversize() {
        encode_header(MessageType::Query, MAX_MESSAGE_SIZE + 1, MessageFlags::NONE).unwrap();
    }

    #[test]
    #[should_panic(expected = "ShortHeader")]
    fn decode_header_short_input() {
        decode_header(&[0xFD, 0x01, 0x01]).unwrap();
    }

    #[test]
    #[should_panic(expected = "BadMagic")]
    fn decode_header_bad_magic() {
        decode_header(&[0xFE, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    }

    #[test]
    #[should_panic(expected = "UnsupportedVersion")]
    fn decode_header_bad_version() {
        decode_header(&[0xFD, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    }

    #[test]
    #[should_panic(expected = "TooLarge")]
    fn decode_header_oversize_length() {
        decode_header(&[0xFD, 0x01, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01]).unwrap();
    }

    #[test]
    #[should_panic(expected = "UnknownMessageType")]
    fn decode_header_unknown_type() {
        decode_header(&[0xFD, 0x01, 0x7F, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    }

    #[test]
    fn message_round_trip() {
        let payload = payload(json!({
            "query": "SELECT * FROM users",
            "nested": { "a": [1, 2, 3], "b": null },
        }));
        let bytes = encode_message(MessageType::Query, &payload).unwrap();
        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.length, bytes.len() - HEADER_SIZE);

        let message = decode_message(header, &bytes[HEADER_SIZE..]).unwrap();
        assert_eq!(message.msg_type, MessageType::Query);
        assert_eq!(message.payload, payload);
    }

    #[test]
    fn empty_payload_is_zero_length() {
        let bytes = encode_message(MessageType::Ping, &Payload::new()).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.length, 0);
        let message = decode_message(header, &[]).unwrap();
        assert!(message.payload.is_empty());
    }

    #[test]
    fn decode_message_rejects_malformed_payload() {
        let cases: [&[u8]; 3] = [b"{not json", b"[1, 2]", &[0xFF, 0xFE, 0x7B]];

        for body in cases {
            let header = MessageHeader {
                msg_type: MessageType::QueryResult,
                flags: MessageFlags::NONE,
                length: body.len(),
            };
            let err = decode_message(header, body).unwrap_err();
            assert!(matches!(err, ProtocolError::Deserialize(_)), "{err:?}");
        }
    }
}
