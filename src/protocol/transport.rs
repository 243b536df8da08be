use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, trace};
use thiserror::Error;

use super::{
    HEADER_SIZE, Message, ProtocolError,
    codec::{decode_header, decode_message, encode_message},
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {address} timed out")]
    Timeout { address: String },
    #[error("failed to connect to {address}: {source}")]
    Connect { address: String, source: io::Error },
    #[error("connection lost while reading data")]
    ConnectionLost,
    #[error("transport IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failure while exchanging a frame: either the stream broke or the bytes
/// read were not a valid frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The header was rejected before its payload was read, so the stream no
    /// longer sits on a frame boundary.
    #[error(transparent)]
    Header(ProtocolError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl FrameError {
    /// Whether the stream is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Transport(_) | FrameError::Header(_))
    }
}

/// Framed, exact-length I/O over a bidirectional byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
}

impl ProtocolTransport<TcpStream> {
    /// Opens a TCP stream to `address`, bounded by `timeout` when given.
    ///
    /// After connecting the stream is switched to blocking mode with no read
    /// or write deadline.
    pub fn open(address: &str, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let connect_err = |source: io::Error| match source.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout {
                address: address.to_string(),
            },
            _ => TransportError::Connect {
                address: address.to_string(),
                source,
            },
        };

        let stream = match timeout {
            None => TcpStream::connect(address).map_err(connect_err)?,
            Some(timeout) => {
                let mut last = io::Error::new(ErrorKind::InvalidInput, "no addresses resolved");
                let mut connected = None;
                for addr in address.to_socket_addrs().map_err(connect_err)? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last = e,
                    }
                }
                connected.ok_or_else(|| connect_err(last))?
            }
        };

        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        stream.set_nodelay(true)?;
        debug!("opened transport to {address}");

        Ok(Self::new(stream))
    }

    /// Shuts the socket down. Errors are ignored.
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!("ignoring error on transport shutdown: {e}");
        }
    }
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads until exactly `n` bytes are buffered.
    pub fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0; n];
        let mut filled = 0;

        while filled < n {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::ConnectionLost),
                Ok(read) => filled += read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf)
    }

    pub fn write_message(&mut self, message: &Message) -> Result<(), FrameError> {
        let bytes = encode_message(message.msg_type, &message.payload)?;
        trace!(
            "sending {} ({} payload bytes)",
            message.msg_type,
            bytes.len() - HEADER_SIZE
        );
        self.write_all(&bytes)?;
        Ok(())
    }

    /// Reads one frame: the fixed header first, then exactly the declared
    /// number of payload bytes.
    pub fn read_message(&mut self) -> Result<Message, FrameError> {
        let header =
            decode_header(&self.read_exactly(HEADER_SIZE)?).map_err(FrameError::Header)?;
        let payload = if header.length > 0 {
            self.read_exactly(header.length)?
        } else {
            Vec::new()
        };
        trace!(
            "received {} ({} payload bytes)",
            header.msg_type, header.length
        );

        Ok(decode_message(header, &payload)?)
    }
}
