//! Decoding of textual query results.
//!
//! The server reports the outcome of a statement as a status string inside the
//! `QUERY_RESULT` payload. The string takes one of a few shapes:
//!
//! - `INSERT 1`, `UPDATE 5`, `DELETE 0`: affected row counts
//! - `CREATE TABLE OK`, `DROP INDEX OK`, `ALTER TABLE OK`: DDL acknowledgements
//! - comma separated rows, one per line, optionally followed by `(N rows)`
//!
//! [`decode`] turns that string into a [`DecodedResult`]. Decoding never fails:
//! anything unrecognised becomes [`StatementKind::Unknown`] with no rows.
//!
//! # Example
//! ```rust
//! use flydb::{StatementKind, Value, result::decode};
//!
//! let result = decode("1, 'x'\n2, 'y'\n(2 rows)", true);
//! assert_eq!(result.kind, StatementKind::Select);
//! assert_eq!(result.rows[1], vec![Value::Int(2), Value::Text("y".into())]);
//! assert_eq!(result.row_count, 2);
//! ```
use std::fmt;

use crate::Value;

/// Kind of statement a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Error,
    Unknown,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Create => "CREATE",
            StatementKind::Drop => "DROP",
            StatementKind::Alter => "ALTER",
            StatementKind::Error => "ERROR",
            StatementKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResult {
    pub kind: StatementKind,
    /// Present only for row-returning statements.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: u64,
    /// The status text as received.
    pub message: String,
}

impl DecodedResult {
    fn status(kind: StatementKind, row_count: u64, message: &str) -> Self {
        Self {
            kind,
            columns: None,
            rows: Vec::new(),
            row_count,
            message: message.to_string(),
        }
    }
}

/// Decodes a server status string. `success` is the payload's success flag.
pub fn decode(message: &str, success: bool) -> DecodedResult {
    if !success {
        return DecodedResult::status(StatementKind::Error, 0, message);
    }

    let counted = [
        ("INSERT", StatementKind::Insert),
        ("UPDATE", StatementKind::Update),
        ("DELETE", StatementKind::Delete),
    ];
    for (verb, kind) in counted {
        if let Some(count) = verb_count(message, verb) {
            return DecodedResult::status(kind, count, message);
        }
    }

    let ddl = [
        ("CREATE", StatementKind::Create),
        ("DROP", StatementKind::Drop),
        ("ALTER", StatementKind::Alter),
    ];
    for (verb, kind) in ddl {
        if is_ddl_ok(message, verb) {
            return DecodedResult::status(kind, 0, message);
        }
    }

    decode_rows(message).unwrap_or_else(|| DecodedResult::status(StatementKind::Unknown, 0, message))
}

/// Matches `<VERB><whitespace><digits>` exactly.
fn verb_count(message: &str, verb: &str) -> Option<u64> {
    let rest = message.strip_prefix(verb)?;
    let digits = rest.trim_start();
    if digits.len() == rest.len() || digits.is_empty() {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Matches `<VERB><ws><word><ws>OK` exactly.
fn is_ddl_ok(message: &str, verb: &str) -> bool {
    let Some(rest) = message.strip_prefix(verb) else {
        return false;
    };
    if !rest.starts_with(char::is_whitespace) {
        return false;
    }
    let Some(object) = rest.trim_start().strip_suffix("OK") else {
        return false;
    };
    let word = object.trim_end();
    word.len() < object.len()
        && !word.is_empty()
        && word.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Extracts `N` from a `(N row)` / `(N rows)` annotation anywhere in `line`.
fn trailing_count(line: &str) -> Option<u64> {
    line.match_indices('(').find_map(|(start, _)| {
        let inner = &line[start + 1..];
        let digits_end = inner
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(inner.len());
        if digits_end == 0 {
            return None;
        }
        let (digits, rest) = inner.split_at(digits_end);
        let word = rest.trim_start();
        if word.len() == rest.len() {
            return None;
        }
        let tail = word.strip_prefix("rows").or_else(|| word.strip_prefix("row"))?;
        tail.starts_with(')').then(|| digits.parse().ok()).flatten()
    })
}

fn decode_rows(message: &str) -> Option<DecodedResult> {
    let mut lines: Vec<&str> = message.trim().split('\n').collect();
    if lines.len() < 2 {
        return None;
    }

    let mut explicit = 0;
    if let Some(count) = lines.last().and_then(|line| trailing_count(line)) {
        explicit = count;
        lines.pop();
    }

    let mut rows: Vec<Vec<Value>> = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_row(line))
        .collect();

    if explicit > 0 && rows.len() as u64 == explicit + 1 && is_header(&rows[0]) {
        rows.remove(0);
    }

    let columns = rows
        .first()
        .map(|row| (0..row.len()).map(|i| format!("column_{i}")).collect());
    let row_count = if explicit > 0 {
        explicit
    } else {
        rows.len() as u64
    };

    Some(DecodedResult {
        kind: StatementKind::Select,
        columns,
        rows,
        row_count,
        message: message.to_string(),
    })
}

/// A line of bare identifiers. Only treated as a column header when the
/// trailing row count leaves exactly one line unaccounted for.
fn is_header(first: &[Value]) -> bool {
    !first.is_empty()
        && first.iter().all(|value| match value {
            Value::Text(s) => is_identifier(s),
            _ => false,
        })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Splits a row on commas. A `"` toggles quoting, which suppresses splitting,
/// and is dropped from the field.
fn parse_row(line: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => values.push(parse_value(&std::mem::take(&mut current))),
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        values.push(parse_value(&current));
    }

    values
}

fn parse_value(raw: &str) -> Value {
    let value = raw.trim();

    if value.eq_ignore_ascii_case("NULL") {
        return Value::Null;
    }
    if value.eq_ignore_ascii_case("TRUE") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("FALSE") {
        return Value::Bool(false);
    }

    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        return Value::Text(value[1..value.len() - 1].to_string());
    }

    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            return Value::Float(f);
        }
    } else if let Ok(i) = value.parse::<i64>() {
        return Value::Int(i);
    }

    Value::Text(value.to_string())
}
