//! Statement execution and result iteration.
//!
//! A [`Cursor`] borrows its [`Connection`], executes statements through it, and
//! buffers the decoded rows of the most recent result for forward-only fetching.
//! Every `execute` replaces whatever the previous statement left behind.
//!
//! # Example
//! ```rust,no_run
//! use flydb::{ConnectConfig, Connection, Params, Value};
//!
//! let conn = Connection::connect(ConnectConfig::default())?;
//! let mut cursor = conn.cursor()?;
//!
//! cursor.execute("INSERT INTO users VALUES (%s, %s)", [Value::from(1), Value::from("Alice")])?;
//! cursor.execute("SELECT * FROM users WHERE name = %(name)s", [("name", Value::from("Alice"))])?;
//!
//! while let Some(row) = cursor.fetchone()? {
//!     println!("{}", row[0]);
//! }
//! # Ok::<(), flydb::Error>(())
//! ```
use std::sync::Arc;

use log::debug;
use serde_json::Value as JsonValue;

use crate::{
    Column, Connection, Error, ErrorKind, FromRow, Params, Row, Value,
    connection::server_error,
    protocol::{Message, MessageType, Payload},
    result::decode,
    value::substitute,
};

#[derive(Debug)]
pub struct Cursor<'conn> {
    connection: &'conn Connection,
    closed: bool,
    /// Default batch size for [`Cursor::fetchmany`].
    pub arraysize: usize,
    description: Option<Vec<Column>>,
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
    position: usize,
    rowcount: Option<u64>,
    last_query: Option<String>,
}

impl<'conn> Cursor<'conn> {
    pub(crate) fn new(connection: &'conn Connection) -> Self {
        Self {
            connection,
            closed: false,
            arraysize: 1,
            description: None,
            columns: Arc::from(Vec::new()),
            rows: Vec::new(),
            position: 0,
            rowcount: None,
            last_query: None,
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.connection
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Column descriptors of the current result; `None` for statements that
    /// return no rows.
    pub fn description(&self) -> Option<&[Column]> {
        self.description.as_deref()
    }

    /// Rows affected or returned by the last statement, `None` when unknown.
    pub fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::interface("cursor is closed"));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.description = None;
        self.columns = Arc::from(Vec::new());
        self.rows.clear();
        self.position = 0;
        self.rowcount = None;
    }

    /// Executes `query` after binding `params` into it.
    pub fn execute(
        &mut self,
        query: &str,
        params: impl Into<Params>,
    ) -> Result<&mut Self, Error> {
        self.check_open()?;
        if self.connection.is_closed() {
            return Err(Error::closed());
        }

        self.reset();
        let query = substitute(query, &params.into())?;
        debug!("executing: {query}");

        let message = Message::query(&query);
        self.last_query = Some(query);
        let response = self.connection.request(&message)?;
        self.handle_response(response)?;
        Ok(self)
    }

    /// Executes a statement previously prepared with
    /// [`Connection::prepare`](crate::Connection::prepare).
    pub fn execute_prepared(&mut self, name: &str, params: &[Value]) -> Result<&mut Self, Error> {
        self.check_open()?;
        if self.connection.is_closed() {
            return Err(Error::closed());
        }

        self.reset();
        let params = params.iter().map(JsonValue::from).collect();
        self.last_query = Some(name.to_string());
        let response = self.connection.request(&Message::execute(name, params))?;
        self.handle_response(response)?;
        Ok(self)
    }

    /// Executes `query` once per parameter set. `rowcount` afterwards is the
    /// total over all executions that reported a count.
    pub fn executemany<I, P>(&mut self, query: &str, params: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.check_open()?;

        let mut total = 0;
        for params in params {
            self.execute(query, params)?;
            total += self.rowcount.unwrap_or(0);
        }
        self.rowcount = Some(total);
        Ok(self)
    }

    fn handle_response(&mut self, response: Message) -> Result<(), Error> {
        match response.msg_type {
            MessageType::QueryResult => self.load_result(response.payload),
            MessageType::Error => Err(server_error(&response, "query execution failed")),
            other => Err(Error::protocol(format!(
                "unexpected response to QUERY: {other}"
            ))),
        }
    }

    fn load_result(&mut self, mut payload: Payload) -> Result<(), Error> {
        let success = payload
            .get("success")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        let message = payload
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        if !success {
            let message = if message.is_empty() {
                "query failed".to_string()
            } else {
                message
            };
            return Err(Error::new(ErrorKind::Query, message));
        }

        let decoded = decode(&message, success);

        let columns = match decoded.columns {
            Some(columns) if !columns.is_empty() => columns,
            _ => payload_columns(&payload),
        };
        let rows = if decoded.rows.is_empty() {
            payload_rows(payload.remove("rows"))
        } else {
            decoded.rows
        };
        let rowcount = if decoded.row_count > 0 {
            decoded.row_count
        } else {
            payload
                .get("row_count")
                .and_then(JsonValue::as_u64)
                .unwrap_or(rows.len() as u64)
        };

        let width = rows.first().map_or(0, Vec::len).max(columns.len());
        let names: Vec<String> = (0..width)
            .map(|i| columns.get(i).cloned().unwrap_or_else(|| format!("column_{i}")))
            .collect();

        if !columns.is_empty() {
            self.description = Some(
                columns
                    .iter()
                    .map(|name| Column { name: name.clone() })
                    .collect(),
            );
        }
        self.columns = names.into();
        self.rows = rows;
        self.rowcount = Some(rowcount);
        self.position = 0;
        Ok(())
    }

    /// The next buffered row, or `None` once the result is exhausted.
    pub fn fetchone(&mut self) -> Result<Option<Row>, Error> {
        self.check_open()?;

        let Some(values) = self.rows.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(Row::new(Arc::clone(&self.columns), values.clone())))
    }

    /// Up to `size` rows, or [`Cursor::arraysize`] rows when `size` is `None`.
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>, Error> {
        self.check_open()?;

        let size = size.unwrap_or(self.arraysize);
        let mut rows = Vec::with_capacity(size.min(self.rows.len()));
        for _ in 0..size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// All remaining rows.
    pub fn fetchall(&mut self) -> Result<Vec<Row>, Error> {
        self.check_open()?;

        let mut rows = Vec::with_capacity(self.rows.len() - self.position);
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The next row converted into `T`.
    pub fn fetch_as<T: FromRow>(&mut self) -> Result<Option<T>, Error> {
        self.fetchone()?.map(|row| row.decode()).transpose()
    }

    /// All remaining rows converted into `T`.
    pub fn fetchall_as<T: FromRow>(&mut self) -> Result<Vec<T>, Error> {
        self.fetchall()?.iter().map(Row::decode::<T>).collect()
    }

    /// Closes the cursor and drops buffered results. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reset();
    }
}

/// Yields the remaining rows. A closed cursor yields nothing.
impl Iterator for Cursor<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetchone().ok().flatten()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn payload_columns(payload: &Payload) -> Vec<String> {
    payload
        .get("columns")
        .and_then(JsonValue::as_array)
        .map(|columns| {
            columns
                .iter()
                .map(|c| match c {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn payload_rows(rows: Option<JsonValue>) -> Vec<Vec<Value>> {
    let Some(JsonValue::Array(rows)) = rows else {
        return Vec::new();
    };
    rows.into_iter()
        .map(|row| match row {
            JsonValue::Array(values) => values.into_iter().map(Value::from).collect(),
            other => vec![Value::from(other)],
        })
        .collect()
}
