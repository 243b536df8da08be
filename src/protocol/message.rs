use std::fmt;

use serde_json::{Map, Value as JsonValue, json};

use super::ProtocolError;

/// Message body: a string keyed mapping sent as a JSON object.
pub type Payload = Map<String, JsonValue>;

/// Message type identifiers, grouped into numeric ranges per operation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Core operations (0x01-0x0F)
    Query,
    QueryResult,
    Error,
    Prepare,
    PrepareResult,
    Execute,
    Deallocate,
    Auth,
    AuthResult,
    Ping,
    Pong,

    // Cursor operations (0x10-0x1F)
    CursorOpen,
    CursorFetch,
    CursorClose,
    CursorScroll,
    CursorResult,

    // Metadata operations (0x20-0x2F)
    GetTables,
    GetColumns,
    GetPrimaryKeys,
    GetForeignKeys,
    GetIndexes,
    GetTypeInfo,
    MetadataResult,

    // Transaction operations (0x30-0x3F)
    BeginTx,
    CommitTx,
    RollbackTx,
    Savepoint,
    TxResult,

    // Session operations (0x40-0x4F)
    SetOption,
    GetOption,
    GetServerInfo,
    SessionResult,
}

impl MessageType {
    /// The only non-error message type a server may answer this request with.
    ///
    /// Returns `None` for result types, which are never sent by a client.
    pub fn response_type(self) -> Option<MessageType> {
        use MessageType::*;

        match self {
            Query | Execute => Some(QueryResult),
            Prepare | Deallocate => Some(PrepareResult),
            Auth => Some(AuthResult),
            Ping => Some(Pong),
            CursorOpen | CursorFetch | CursorClose | CursorScroll => Some(CursorResult),
            GetTables | GetColumns | GetPrimaryKeys | GetForeignKeys | GetIndexes
            | GetTypeInfo => Some(MetadataResult),
            BeginTx | CommitTx | RollbackTx | Savepoint => Some(TxResult),
            SetOption | GetOption | GetServerInfo => Some(SessionResult),
            QueryResult | Error | PrepareResult | AuthResult | Pong | CursorResult
            | MetadataResult | TxResult | SessionResult => None,
        }
    }

    /// Whether `response` is an acceptable answer to a request of this type.
    pub fn accepts(self, response: MessageType) -> bool {
        response == MessageType::Error || self.response_type() == Some(response)
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        use MessageType::*;

        match value {
            Query => 0x01,
            QueryResult => 0x02,
            Error => 0x03,
            Prepare => 0x04,
            PrepareResult => 0x05,
            Execute => 0x06,
            Deallocate => 0x07,
            Auth => 0x08,
            AuthResult => 0x09,
            Ping => 0x0A,
            Pong => 0x0B,
            CursorOpen => 0x10,
            CursorFetch => 0x11,
            CursorClose => 0x12,
            CursorScroll => 0x13,
            CursorResult => 0x14,
            GetTables => 0x20,
            GetColumns => 0x21,
            GetPrimaryKeys => 0x22,
            GetForeignKeys => 0x23,
            GetIndexes => 0x24,
            GetTypeInfo => 0x25,
            MetadataResult => 0x26,
            BeginTx => 0x30,
            CommitTx => 0x31,
            RollbackTx => 0x32,
            Savepoint => 0x33,
            TxResult => 0x34,
            SetOption => 0x40,
            GetOption => 0x41,
            GetServerInfo => 0x42,
            SessionResult => 0x43,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        use MessageType::*;

        let kind = match value {
            0x01 => Query,
            0x02 => QueryResult,
            0x03 => Error,
            0x04 => Prepare,
            0x05 => PrepareResult,
            0x06 => Execute,
            0x07 => Deallocate,
            0x08 => Auth,
            0x09 => AuthResult,
            0x0A => Ping,
            0x0B => Pong,
            0x10 => CursorOpen,
            0x11 => CursorFetch,
            0x12 => CursorClose,
            0x13 => CursorScroll,
            0x14 => CursorResult,
            0x20 => GetTables,
            0x21 => GetColumns,
            0x22 => GetPrimaryKeys,
            0x23 => GetForeignKeys,
            0x24 => GetIndexes,
            0x25 => GetTypeInfo,
            0x26 => MetadataResult,
            0x30 => BeginTx,
            0x31 => CommitTx,
            0x32 => RollbackTx,
            0x33 => Savepoint,
            0x34 => TxResult,
            0x40 => SetOption,
            0x41 => GetOption,
            0x42 => GetServerInfo,
            0x43 => SessionResult,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}(0x{:02X})", u8::from(*self))
    }
}

/// Bit-mask carried in the header flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MessageFlags(u8);

impl MessageFlags {
    pub const NONE: MessageFlags = MessageFlags(0x00);
    pub const COMPRESSED: MessageFlags = MessageFlags(0x01);
    pub const ENCRYPTED: MessageFlags = MessageFlags(0x02);

    const KNOWN: u8 = Self::COMPRESSED.0 | Self::ENCRYPTED.0;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = MessageFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        MessageFlags(self.0 | rhs.0)
    }
}

impl TryFrom<u8> for MessageFlags {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value & !Self::KNOWN != 0 {
            return Err(ProtocolError::UnknownFlags(value));
        }
        Ok(MessageFlags(value))
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msg_type: MessageType,
    pub flags: MessageFlags,
    pub payload: Payload,
}

/// Filters for the metadata requests. Unset fields are left out of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub table_types: Option<Vec<String>>,
}

impl MetadataFilter {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table_name: Some(name.into()),
            ..Default::default()
        }
    }

    fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        let fields = [
            ("catalog", self.catalog),
            ("schema", self.schema),
            ("table_name", self.table_name),
            ("column_name", self.column_name),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                payload.insert(key.into(), JsonValue::String(value));
            }
        }
        if let Some(types) = self.table_types {
            payload.insert("table_types".into(), json!(types));
        }
        payload
    }
}

/// Options sent with `BEGIN_TX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation_level: u8,
    pub read_only: bool,
    pub deferrable: bool,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            isolation_level: 1,
            read_only: false,
            deferrable: false,
        }
    }
}

impl Message {
    pub fn new(msg_type: MessageType, payload: Payload) -> Self {
        Self {
            msg_type,
            flags: MessageFlags::NONE,
            payload,
        }
    }

    pub fn empty(msg_type: MessageType) -> Self {
        Self::new(msg_type, Payload::new())
    }

    fn with(msg_type: MessageType, value: JsonValue) -> Self {
        match value {
            JsonValue::Object(payload) => Self::new(msg_type, payload),
            _ => Self::empty(msg_type),
        }
    }

    pub fn auth(username: &str, password: &str) -> Self {
        Self::with(
            MessageType::Auth,
            json!({ "username": username, "password": password }),
        )
    }

    pub fn query(query: &str) -> Self {
        Self::with(MessageType::Query, json!({ "query": query }))
    }

    pub fn prepare(name: &str, query: &str) -> Self {
        Self::with(MessageType::Prepare, json!({ "name": name, "query": query }))
    }

    pub fn execute(name: &str, params: Vec<JsonValue>) -> Self {
        Self::with(MessageType::Execute, json!({ "name": name, "params": params }))
    }

    pub fn deallocate(name: &str) -> Self {
        Self::with(MessageType::Deallocate, json!({ "name": name }))
    }

    pub fn ping() -> Self {
        Self::empty(MessageType::Ping)
    }

    pub fn begin(options: TxOptions) -> Self {
        Self::with(
            MessageType::BeginTx,
            json!({
                "isolation_level": options.isolation_level,
                "read_only": options.read_only,
                "deferrable": options.deferrable,
            }),
        )
    }

    pub fn commit() -> Self {
        Self::empty(MessageType::CommitTx)
    }

    pub fn rollback() -> Self {
        Self::empty(MessageType::RollbackTx)
    }

    pub fn get_tables(filter: MetadataFilter) -> Self {
        Self::new(MessageType::GetTables, filter.into_payload())
    }

    pub fn get_columns(filter: MetadataFilter) -> Self {
        Self::new(MessageType::GetColumns, filter.into_payload())
    }

    pub fn set_option(option: &str, value: JsonValue) -> Self {
        Self::with(
            MessageType::SetOption,
            json!({ "option": option, "value": value }),
        )
    }

    pub fn get_option(option: &str) -> Self {
        Self::with(MessageType::GetOption, json!({ "option": option }))
    }

    pub fn get_server_info() -> Self {
        Self::empty(MessageType::GetServerInfo)
    }

    /// `payload["success"]`, treating anything but `true` as failure.
    pub fn success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    /// `payload["message"]` when it is a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(JsonValue::as_str)
    }

    /// Server message, falling back to `default` when absent.
    pub fn server_message(&self, default: &str) -> String {
        self.text("message").unwrap_or(default).to_string()
    }
}
