//! Parameter values and decoded rows.

use crate::DbError;
use base64::Engine;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

macro_rules! integer_value {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Integer(v as i64)
                }
            }
        )+
    };
}

integer_value!(i32, i64, u32);

/// Versions and counters are stored as SQLite INTEGER, which is signed.
/// Values past `i64::MAX` saturate.
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row, decoded to JSON by column name so it can be read back
/// through serde.
#[derive(Debug, Clone, Default)]
pub struct Row {
    fields: Map<String, Json>,
}

impl Row {
    pub(crate) fn decode(columns: &[String], row: &rusqlite::Row<'_>) -> Result<Self, DbError> {
        let mut fields = Map::with_capacity(columns.len());
        for (index, name) in columns.iter().enumerate() {
            fields.insert(name.clone(), column_to_json(row.get_ref(index)?)?);
        }
        Ok(Self { fields })
    }

    /// Column value by name.
    pub fn get(&self, column: &str) -> Option<&Json> {
        self.fields.get(column)
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, DbError> {
        Ok(serde_json::from_value(Json::Object(self.fields.clone()))?)
    }
}

/// Rows of one query, in result order.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn deserialize_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, DbError> {
        self.rows.iter().map(Row::deserialize).collect()
    }
}

fn column_to_json(value: ValueRef<'_>) -> Result<Json, DbError> {
    Ok(match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        // NaN and infinities have no JSON form
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        ValueRef::Text(t) => Json::String(
            std::str::from_utf8(t)
                .map_err(|e| DbError::TypeError(e.to_string()))?
                .to_owned(),
        ),
        // Non-UTF-8 blobs surface as base64 text
        ValueRef::Blob(b) => Json::String(match std::str::from_utf8(b) {
            Ok(s) => s.to_owned(),
            Err(_) => base64::engine::general_purpose::STANDARD.encode(b),
        }),
    })
}
