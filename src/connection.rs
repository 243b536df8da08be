//! Connection to a FlyDB server.
//!
//! A [`Connection`] owns one TCP transport and drives the request/response
//! exchanges of the binary protocol over it: the authentication handshake,
//! transaction control, server metadata, and the queries issued by its cursors.
//!
//! # States
//!
//! ```text
//! Connecting -> Open -> (Authenticated) -> Closed
//! ```
//!
//! `InTransaction` is tracked as a flag on top of the open states. Once closed,
//! either explicitly, on drop, or because the transport failed, a connection
//! never reopens.
//!
//! # Concurrency
//!
//! All transport access goes through one mutex. [`Connection::request`] holds
//! it across the send and the matching receive, so callers sharing a
//! connection (including several cursors) are strictly serialized.
//!
//! # Example
//! ```rust,no_run
//! use flydb::{ConnectConfig, Connection};
//!
//! let conn = Connection::connect(ConnectConfig::default().user("admin").password("secret"))?;
//! let mut cursor = conn.cursor()?;
//! cursor.execute("SELECT * FROM users", ())?;
//! for row in cursor.fetchall()? {
//!     println!("{row}");
//! }
//! # Ok::<(), flydb::Error>(())
//! ```
use std::{
    fmt,
    net::TcpStream,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, warn};
use serde_json::Value as JsonValue;

use crate::{
    ConnectConfig, Cursor, Error, ErrorKind,
    protocol::{
        FrameError, Message, MessageType, MetadataFilter, Payload, ProtocolTransport, TxOptions,
    },
};

/// Mutable connection state, guarded by the connection mutex.
struct Session {
    transport: Option<ProtocolTransport<TcpStream>>,
    closed: bool,
    authenticated: bool,
    in_transaction: bool,
    autocommit: bool,
    server_info: Option<Payload>,
}

impl Session {
    fn transport(&mut self) -> Result<&mut ProtocolTransport<TcpStream>, Error> {
        if self.closed {
            return Err(Error::closed());
        }
        self.transport
            .as_mut()
            .ok_or_else(|| Error::interface("not connected"))
    }

    /// Marks the session closed after a broken read or write, or after a
    /// rejected header. The framing has no resynchronization point, so the
    /// stream is unusable from here on.
    fn poison(&mut self, err: FrameError) -> Error {
        if err.is_fatal() {
            warn!("unrecoverable frame error, closing connection: {err}");
            self.closed = true;
            if let Some(transport) = self.transport.take() {
                transport.close();
            }
        }
        match err {
            FrameError::Transport(e) => {
                Error::new(ErrorKind::Connection, e.to_string()).with_source(e)
            }
            FrameError::Header(e) | FrameError::Protocol(e) => e.into(),
        }
    }

    fn send(&mut self, message: &Message) -> Result<(), Error> {
        let res = self.transport()?.write_message(message);
        res.map_err(|e| self.poison(e))
    }

    fn receive(&mut self) -> Result<Message, Error> {
        let res = self.transport()?.read_message();
        res.map_err(|e| self.poison(e))
    }

    /// Sends `message` and returns the response, which must be the documented
    /// counterpart of the request type or `ERROR`.
    fn request(&mut self, message: &Message) -> Result<Message, Error> {
        self.send(message)?;
        let response = self.receive()?;

        if !message.msg_type.accepts(response.msg_type) {
            return Err(Error::protocol(format!(
                "unexpected response to {}: {}",
                message.msg_type, response.msg_type
            )));
        }
        Ok(response)
    }

    fn authenticate(&mut self, user: &str, password: &str) -> Result<(), Error> {
        let response = self.request(&Message::auth(user, password))?;

        match response.msg_type {
            MessageType::AuthResult if response.success() => {
                debug!("authenticated as {user}");
                self.authenticated = true;
                Ok(())
            }
            MessageType::AuthResult => Err(Error::new(
                ErrorKind::Authentication,
                response.server_message("authentication failed"),
            )),
            _ => Err(Error::new(
                ErrorKind::Authentication,
                response.server_message("authentication error"),
            )),
        }
    }

    /// Sends COMMIT_TX or ROLLBACK_TX when a transaction is open.
    fn finish_transaction(&mut self, message: Message, action: &str) -> Result<(), Error> {
        if self.closed {
            return Err(Error::closed());
        }
        if self.autocommit || !self.in_transaction {
            return Ok(());
        }

        let response = self.request(&message)?;
        match response.msg_type {
            MessageType::TxResult if response.success() => {
                debug!("transaction {action} complete");
                self.in_transaction = false;
                Ok(())
            }
            MessageType::TxResult => Err(Error::new(
                ErrorKind::Transaction,
                response.server_message(&format!("{action} failed")),
            )),
            _ => Err(Error::new(
                ErrorKind::Transaction,
                response.server_message(&format!("{action} error")),
            )),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        if self.in_transaction {
            if let Err(e) = self.finish_transaction(Message::rollback(), "rollback") {
                warn!("ignoring rollback failure during close: {e}");
            }
        }

        self.closed = true;
        self.in_transaction = false;
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        debug!("connection closed");
    }
}

/// A connection to a FlyDB server.
pub struct Connection {
    config: ConnectConfig,
    session: Mutex<Session>,
}

impl Connection {
    /// Opens a transport to the configured server and, when both a user and a
    /// password are configured, authenticates.
    pub fn connect(config: ConnectConfig) -> Result<Self, Error> {
        let address = config.address();
        debug!("connecting to {address}");
        let transport = ProtocolTransport::open(&address, config.connect_timeout)?;

        let conn = Connection {
            session: Mutex::new(Session {
                transport: Some(transport),
                closed: false,
                authenticated: false,
                in_transaction: false,
                autocommit: config.autocommit,
                server_info: None,
            }),
            config,
        };

        if let (true, Some(user), Some(password)) = (
            conn.config.has_credentials(),
            &conn.config.user,
            &conn.config.password,
        ) {
            conn.session().authenticate(user, password)?;
        }

        Ok(conn)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.session().closed
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().authenticated
    }

    pub fn in_transaction(&self) -> bool {
        self.session().in_transaction
    }

    pub fn autocommit(&self) -> bool {
        self.session().autocommit
    }

    pub fn set_autocommit(&self, autocommit: bool) {
        self.session().autocommit = autocommit;
    }

    /// Sends one message without waiting for a response.
    pub fn send_message(&self, message: &Message) -> Result<(), Error> {
        self.session().send(message)
    }

    /// Reads the next message from the server.
    pub fn receive_message(&self) -> Result<Message, Error> {
        self.session().receive()
    }

    /// One request/response exchange under a single hold of the connection
    /// lock. Responses of any type other than the request's counterpart or
    /// `ERROR` are rejected as protocol errors.
    pub fn request(&self, message: &Message) -> Result<Message, Error> {
        self.session().request(message)
    }

    pub fn cursor(&self) -> Result<Cursor<'_>, Error> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        Ok(Cursor::new(self))
    }

    /// Starts an explicit transaction.
    pub fn begin(&self, options: TxOptions) -> Result<(), Error> {
        let mut session = self.session();
        if session.closed {
            return Err(Error::closed());
        }
        if session.autocommit {
            return Err(Error::new(
                ErrorKind::Transaction,
                "cannot begin a transaction in autocommit mode",
            ));
        }
        if session.in_transaction {
            return Err(Error::new(
                ErrorKind::Transaction,
                "transaction already active",
            ));
        }

        let response = session.request(&Message::begin(options))?;
        match response.msg_type {
            MessageType::TxResult if response.success() => {
                debug!("transaction started");
                session.in_transaction = true;
                Ok(())
            }
            _ => Err(Error::new(
                ErrorKind::Transaction,
                response.server_message("begin failed"),
            )),
        }
    }

    /// Commits the open transaction. A no-op in autocommit mode or when no
    /// transaction is active.
    pub fn commit(&self) -> Result<(), Error> {
        self.session()
            .finish_transaction(Message::commit(), "commit")
    }

    /// Rolls back the open transaction. A no-op in autocommit mode or when no
    /// transaction is active.
    pub fn rollback(&self) -> Result<(), Error> {
        self.session()
            .finish_transaction(Message::rollback(), "rollback")
    }

    /// Checks that the server answers. Never fails; any error reads as `false`.
    pub fn ping(&self) -> bool {
        let mut session = self.session();
        if session.closed {
            return false;
        }
        match session.request(&Message::ping()) {
            Ok(response) => response.msg_type == MessageType::Pong,
            Err(e) => {
                debug!("ping failed: {e}");
                false
            }
        }
    }

    /// Server information. The first non-empty answer is cached.
    pub fn server_info(&self) -> Result<Payload, Error> {
        let mut session = self.session();
        if session.closed {
            return Err(Error::closed());
        }
        if let Some(info) = &session.server_info {
            return Ok(info.clone());
        }

        let response = session.request(&Message::get_server_info())?;
        match response.msg_type {
            MessageType::SessionResult => {
                if !response.payload.is_empty() {
                    session.server_info = Some(response.payload.clone());
                }
                Ok(response.payload)
            }
            _ => Err(server_error(&response, "failed to get server info")),
        }
    }

    pub fn set_option(&self, option: &str, value: impl Into<JsonValue>) -> Result<(), Error> {
        let response = self.request(&Message::set_option(option, value.into()))?;
        let rejected = response.payload.get("success") == Some(&JsonValue::Bool(false));
        match response.msg_type {
            MessageType::SessionResult if !rejected => Ok(()),
            _ => Err(server_error(
                &response,
                &format!("failed to set option '{option}'"),
            )),
        }
    }

    pub fn get_option(&self, option: &str) -> Result<Option<JsonValue>, Error> {
        let mut response = self.request(&Message::get_option(option))?;
        match response.msg_type {
            MessageType::SessionResult => Ok(response.payload.remove("value")),
            _ => Err(server_error(&response, &format!("failed to get option '{option}'"))),
        }
    }

    /// Table metadata matching `filter`, as returned by the server.
    pub fn tables(&self, filter: MetadataFilter) -> Result<Payload, Error> {
        self.metadata(Message::get_tables(filter))
    }

    /// Column metadata matching `filter`, as returned by the server.
    pub fn columns(&self, filter: MetadataFilter) -> Result<Payload, Error> {
        self.metadata(Message::get_columns(filter))
    }

    fn metadata(&self, message: Message) -> Result<Payload, Error> {
        let response = self.request(&message)?;
        match response.msg_type {
            MessageType::MetadataResult => Ok(response.payload),
            _ => Err(server_error(&response, "metadata request failed")),
        }
    }

    /// Prepares a named statement on the server.
    pub fn prepare(&self, name: &str, query: &str) -> Result<(), Error> {
        self.prepared(Message::prepare(name, query), "prepare failed")
    }

    /// Releases a named statement on the server.
    pub fn deallocate(&self, name: &str) -> Result<(), Error> {
        self.prepared(Message::deallocate(name), "deallocate failed")
    }

    fn prepared(&self, message: Message, default: &str) -> Result<(), Error> {
        let response = self.request(&message)?;
        match response.msg_type {
            MessageType::PrepareResult if response.success() => Ok(()),
            MessageType::PrepareResult => Err(Error::new(
                ErrorKind::Query,
                response.server_message(default),
            )),
            _ => Err(server_error(&response, default)),
        }
    }

    /// Runs `f` with this connection, then closes it.
    ///
    /// On success an open transaction is committed (unless autocommit is on);
    /// on failure it is rolled back and the rollback outcome is discarded.
    pub fn scope<T, F>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let res = match f(&self) {
            Ok(value) => self.commit().map(|_| value),
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    warn!("ignoring rollback failure: {rollback}");
                }
                Err(e)
            }
        };
        self.close();
        res
    }

    /// Closes the connection, rolling back any open transaction. Safe to call
    /// repeatedly; never fails.
    pub fn close(&self) {
        self.session().close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.config.address())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Translates an `ERROR` response into a database error carrying the server
/// code when present.
pub(crate) fn server_error(response: &Message, default: &str) -> Error {
    let mut err = Error::database(response.server_message(default));
    if let Some(code) = response.payload.get("code").and_then(JsonValue::as_i64) {
        err = err.with_code(code);
    }
    if let Some(sqlstate) = response.text("sqlstate") {
        err = err.with_sqlstate(sqlstate);
    }
    err
}
