//! Driver error type.
//!
//! Every fallible operation in the driver returns [`Error`]. Instead of a deep
//! hierarchy of error types, an error carries an [`ErrorKind`] tag that callers
//! match on to tell failure categories apart, together with the server supplied
//! message, numeric code and SQLSTATE when present.
//!
//! # Example
//! ```rust
//! use flydb::{Error, ErrorKind};
//!
//! let err = Error::new(ErrorKind::Interface, "connection is closed");
//! assert!(err.is_interface());
//! assert_eq!(err.kind(), ErrorKind::Interface);
//! ```
use std::{error::Error as StdError, fmt};

use crate::protocol::{ProtocolError, TransportError};

/// Subtypes of errors reported by the database itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    General,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

/// Failure category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Misuse of the driver: closed connection/cursor, bad local input.
    Interface,
    /// Error reported by the server.
    Database(DatabaseErrorKind),
    /// Connect failure or a broken stream.
    Connection,
    /// Malformed frame, payload, or unexpected response type.
    Protocol,
    Authentication,
    Query,
    Transaction,
    Cursor,
    /// Connect timeout elapsed.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Interface => "interface error",
            ErrorKind::Database(DatabaseErrorKind::General) => "database error",
            ErrorKind::Database(DatabaseErrorKind::Data) => "data error",
            ErrorKind::Database(DatabaseErrorKind::Operational) => "operational error",
            ErrorKind::Database(DatabaseErrorKind::Integrity) => "integrity error",
            ErrorKind::Database(DatabaseErrorKind::Internal) => "internal error",
            ErrorKind::Database(DatabaseErrorKind::Programming) => "programming error",
            ErrorKind::Database(DatabaseErrorKind::NotSupported) => "not supported",
            ErrorKind::Connection => "connection error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::Authentication => "authentication error",
            ErrorKind::Query => "query error",
            ErrorKind::Transaction => "transaction error",
            ErrorKind::Cursor => "cursor error",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    code: Option<i64>,
    sqlstate: Option<String>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            sqlstate: None,
            source: None,
        }
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Interface, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database(DatabaseErrorKind::Programming), message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database(DatabaseErrorKind::General), message)
    }

    pub(crate) fn closed() -> Self {
        Self::interface("connection is closed")
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric error code supplied by the server, if any.
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.sqlstate.as_deref()
    }

    /// Errors raised by the driver itself rather than the database.
    pub fn is_interface(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Interface | ErrorKind::Connection | ErrorKind::Protocol | ErrorKind::Cursor
        )
    }

    /// Errors originating from the database.
    pub fn is_database(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Database(_)
                | ErrorKind::Query
                | ErrorKind::Authentication
                | ErrorKind::Transaction
                | ErrorKind::Timeout
        )
    }

    pub fn is_operational(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Database(DatabaseErrorKind::Operational)
                | ErrorKind::Authentication
                | ErrorKind::Transaction
                | ErrorKind::Timeout
        )
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Error::protocol(value.to_string()).with_source(value)
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        let kind = match value {
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Connection,
        };
        Error::new(kind, value.to_string()).with_source(value)
    }
}
