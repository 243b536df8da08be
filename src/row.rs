use std::{collections::HashMap, fmt, ops::Index, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::{Error, Value};

/// Column descriptor of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
}

/// One result row: values paired with the shared column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let pos = self.columns.iter().position(|c| c == name)?;
        self.values.get(pos)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Values keyed by column name.
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// Converts the row into a typed record.
    pub fn decode<T: FromRow>(&self) -> Result<T, Error> {
        T::from_row(self)
    }

    fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), JsonValue::from(value)))
            .collect();
        JsonValue::Object(map)
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl Index<&str> for Row {
    type Output = Value;

    fn index(&self, name: &str) -> &Self::Output {
        match self.get(name) {
            Some(value) => value,
            None => panic!("row has no column '{name}'"),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.values {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Conversion from a result row into a typed record.
///
/// Any type implementing `serde::Deserialize` gets an implementation that reads
/// fields by column name.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, Error>;
}

impl<T: DeserializeOwned> FromRow for T {
    fn from_row(row: &Row) -> Result<Self, Error> {
        serde_json::from_value(row.to_json()).map_err(|e| {
            Error::new(
                crate::ErrorKind::Database(crate::DatabaseErrorKind::Data),
                format!("failed to convert row: {e}"),
            )
            .with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    fn row() -> Row {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        Row::new(columns, vec![Value::Int(1), Value::Text("Alice".into())])
    }

    #[test]
    fn row_access_by_name_and_index() {
        let row = row();
        assert_eq!(row.get("name"), Some(&Value::Text("Alice".into())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row[0], Value::Int(1));
        assert_eq!(row["id"], Value::Int(1));
        assert_eq!(row.get_index(5), None);
    }

    #[test]
    fn row_to_map() {
        let map = row().to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["name"], Value::Text("Alice".into()));
    }

    #[test]
    fn row_display() {
        assert_eq!(row().to_string(), "1, Alice");
    }

    #[test]
    #[should_panic(expected = "row has no column 'email'")]
    fn row_index_missing_column() {
        let _ = &row()["email"];
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    #[test]
    fn row_into_record() {
        let user: User = row().decode().unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "Alice".into()
            }
        );
    }

    #[test]
    fn row_into_record_type_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrong {
            id: String,
        }

        let err = row().decode::<Wrong>().unwrap_err();
        assert!(err.is_database());
    }
}
