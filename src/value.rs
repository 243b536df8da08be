//! Scalar values and client-side parameter substitution.
//!
//! Queries are sent as plain text, so bound parameters are rendered into SQL
//! literals on the client before the `QUERY` message is built. Two placeholder
//! styles are supported:
//!
//! - positional `%s`, bound from [`Params::Positional`]
//! - named `%(name)s`, bound from [`Params::Named`]
//!
//! # Example
//! ```rust
//! use flydb::{Params, Value, value::substitute};
//!
//! let params = Params::from(vec![Value::from(1), Value::from("it's")]);
//! let query = substitute("SELECT * FROM t WHERE id = %s AND name = %s", &params).unwrap();
//! assert_eq!(query, "SELECT * FROM t WHERE id = 1 AND name = 'it''s'");
//! ```
use std::{collections::HashMap, fmt};

use serde_json::Value as JsonValue;

use crate::Error;

/// A typed scalar as decoded from a result row or bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

macro_rules! value_from {
    ($variant:ident: $($ty:ty),+ => $conv:expr) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant($conv(value))
                }
            }
        )+
    };
}

value_from!(Bool: bool => |v| v);
value_from!(Int: i8, i16, i32, i64, u8, u16, u32 => i64::from);
value_from!(Float: f32, f64 => f64::from);
value_from!(Text: String, &str, &String => |v: _| String::from(v));

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<&Value> for JsonValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

/// Renders a value as a SQL literal.
///
/// `NULL`, `TRUE`/`FALSE`, and numbers are emitted bare; text is single quoted
/// with embedded single quotes doubled.
pub fn escape(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => value.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// Parameters bound to a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(values) => values.is_empty(),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(value: Vec<Value>) -> Self {
        Params::Positional(value)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(value: [Value; N]) -> Self {
        Params::Positional(value.into())
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(value: HashMap<String, Value>) -> Self {
        Params::Named(value)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Params {
    fn from(value: [(K, Value); N]) -> Self {
        Params::Named(value.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Binds `params` into `query`. Empty parameters leave the query untouched.
pub fn substitute(query: &str, params: &Params) -> Result<String, Error> {
    if params.is_empty() {
        return Ok(query.to_string());
    }

    match params {
        Params::None => Ok(query.to_string()),
        Params::Positional(values) => substitute_positional(query, values),
        Params::Named(values) => substitute_named(query, values),
    }
}

fn substitute_positional(query: &str, values: &[Value]) -> Result<String, Error> {
    let parts: Vec<&str> = query.split("%s").collect();
    let placeholders = parts.len() - 1;
    if placeholders != values.len() {
        return Err(Error::programming(format!(
            "query requires {placeholders} parameters, but {} provided",
            values.len()
        )));
    }

    let mut out = String::with_capacity(query.len());
    for (part, value) in parts.iter().zip(values) {
        out.push_str(part);
        out.push_str(&escape(value));
    }
    out.push_str(parts[placeholders]);
    Ok(out)
}

fn substitute_named(query: &str, values: &HashMap<String, Value>) -> Result<String, Error> {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('%') {
            out.push('%');
            rest = after;
        } else if let Some(named) = tail.strip_prefix('(') {
            let close = named
                .find(")s")
                .ok_or_else(|| Error::programming("unterminated named placeholder"))?;
            let key = &named[..close];
            let value = values
                .get(key)
                .ok_or_else(|| Error::programming(format!("missing parameter '{key}'")))?;
            out.push_str(&escape(value));
            rest = &named[close + 2..];
        } else {
            return Err(Error::programming(format!(
                "unsupported format character after '%' at offset {}",
                query.len() - rest.len() + pos
            )));
        }
    }

    out.push_str(rest);
    Ok(out)
}
