//! Test utilities for driver integration tests.
//!
//! Provides a scripted FlyDB server on a loopback port. Each request the client
//! sends is passed to a handler that returns the response to write back, or
//! `None` to drop the connection.
#![allow(dead_code)]

use std::{
    net::TcpListener,
    thread::{self, JoinHandle},
};

use flydb::{
    ConnectConfig,
    protocol::{Message, MessageType, Payload, ProtocolTransport, codec::encode_message},
};
use serde_json::{Value as JsonValue, json};

/// A single-connection fake server running on its own thread.
pub struct FakeServer {
    port: u16,
    handle: JoinHandle<Vec<Message>>,
}

impl FakeServer {
    /// Starts listening on an available port and serves the first connection
    /// with `handler`.
    pub fn start<F>(mut handler: F) -> Self
    where
        F: FnMut(&Message) -> Option<Message> + Send + 'static,
    {
        Self::start_raw(move |request| {
            handler(request).map(|response| {
                encode_message(response.msg_type, &response.payload).unwrap()
            })
        })
    }

    /// Like [`FakeServer::start`], but the handler returns the exact bytes to
    /// write back.
    pub fn start_raw<F>(mut handler: F) -> Self
    where
        F: FnMut(&Message) -> Option<Vec<u8>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut transport = ProtocolTransport::new(stream);
            let mut received = Vec::new();

            while let Ok(request) = transport.read_message() {
                let response = handler(&request);
                received.push(request);
                match response {
                    Some(bytes) => {
                        if transport.write_all(&bytes).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            received
        });

        Self { port, handle }
    }

    /// Serves requests with [`default_response`].
    pub fn standard() -> Self {
        Self::start(|request| Some(default_response(request)))
    }

    pub fn config(&self) -> ConnectConfig {
        ConnectConfig::new("127.0.0.1", self.port)
    }

    /// Waits for the serving thread to end and returns every request received.
    ///
    /// The thread ends when the handler drops the connection or the client
    /// disconnects.
    pub fn finish(self) -> Vec<Message> {
        self.handle.join().unwrap()
    }
}

/// Builds a message from a JSON object literal.
pub fn reply(msg_type: MessageType, payload: JsonValue) -> Message {
    match payload {
        JsonValue::Object(payload) => Message::new(msg_type, payload),
        other => panic!("payload must be an object, got {other}"),
    }
}

pub fn query_result(message: &str) -> Message {
    reply(
        MessageType::QueryResult,
        json!({ "success": true, "message": message }),
    )
}

pub fn error(message: &str, code: i64) -> Message {
    reply(
        MessageType::Error,
        json!({ "message": message, "code": code }),
    )
}

/// A well-behaved server: accepts any credentials, answers every request
/// with a successful result of the matching type.
pub fn default_response(request: &Message) -> Message {
    match request.msg_type {
        MessageType::Auth => reply(MessageType::AuthResult, json!({ "success": true })),
        MessageType::Ping => Message::empty(MessageType::Pong),
        MessageType::Query => query_result("OK"),
        MessageType::BeginTx | MessageType::CommitTx | MessageType::RollbackTx => {
            reply(MessageType::TxResult, json!({ "success": true }))
        }
        MessageType::GetServerInfo => reply(
            MessageType::SessionResult,
            json!({ "server": "FlyDB", "version": "01.26.9" }),
        ),
        other => error(&format!("unsupported request {other}"), 1),
    }
}

/// String field of a request payload.
pub fn field<'a>(payload: &'a Payload, key: &str) -> &'a str {
    payload.get(key).and_then(JsonValue::as_str).unwrap()
}
