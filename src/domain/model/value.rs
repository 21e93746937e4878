//! Native (in-memory) and storage (SQLite) value models.

use crate::domain::model::{Entity, Persistable};
use crate::error::{MetaError, MetaResult};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use std::fmt;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// `1970-01-01 00:00:00`, the zero value of timestamp and date fields.
pub fn epoch() -> NaiveDateTime {
    chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.naive_utc()
}

/// A value as SQLite stores it.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl StorageValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StorageValue::Null)
    }

    /// Generic string rendering, used for columns without a descriptor.
    pub fn to_text(&self) -> Option<String> {
        match self {
            StorageValue::Null => None,
            StorageValue::Integer(i) => Some(i.to_string()),
            StorageValue::Real(f) => Some(f.to_string()),
            StorageValue::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

/// A field value as entities see it.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Json(JsonValue),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    /// A referenced entity (object-reference fields).
    Object(Box<dyn Persistable>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Bool(_) => "bool",
            Value::Json(_) => "json",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Object(_) => "object",
        }
    }

    /// Plain JSON rendering. With `deep = false` references collapse to their identity.
    pub fn to_json(&self, deep: bool) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Text(s) => JsonValue::from(s.as_str()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Real(f) => JsonValue::from(*f),
            Value::Bool(b) => JsonValue::from(*b),
            Value::Json(v) => v.clone(),
            Value::Timestamp(ts) => JsonValue::from(ts.format(TIMESTAMP_FORMAT).to_string()),
            Value::Date(d) => JsonValue::from(d.format(DATE_FORMAT).to_string()),
            Value::Object(obj) if deep => obj.to_dict(true),
            Value::Object(obj) => obj
                .identity()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
        }
    }

    /// Unwraps an object-reference value into a concrete entity type.
    pub fn into_entity<E: Entity>(self) -> MetaResult<Option<E>> {
        match self {
            Value::Null => Ok(None),
            Value::Object(obj) => {
                let class = obj.class_name();
                obj.into_any()
                    .downcast::<E>()
                    .map(|e| Some(*e))
                    .map_err(|_| {
                        MetaError::Conversion(format!(
                            "expected a '{}' reference, got '{}'",
                            E::CLASS,
                            class
                        ))
                    })
            }
            other => Err(mismatch(E::CLASS, &other)),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> MetaError {
    MetaError::Conversion(format!("expected {}, got {}", expected, got.type_name()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.class_name() == b.class_name() && a.identity().is_some() && a.identity() == b.identity()
            }
            _ => false,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Box<dyn Persistable>> for Value {
    fn from(v: Box<dyn Persistable>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// Null converts to the type's zero value; entities hold plain Rust fields.

impl TryFrom<Value> for String {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(s) => Ok(s),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(0),
            Value::Integer(i) => Ok(i),
            Value::Bool(b) => Ok(b as i64),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| MetaError::Conversion(format!("'{}' is not an integer", s))),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(0.0),
            Value::Real(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            Value::Integer(i) => Ok(i == 1),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for JsonValue {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(JsonValue::Object(Default::default())),
            Value::Json(v) => Ok(v),
            other => Err(mismatch("json", &other)),
        }
    }
}

impl TryFrom<Value> for NaiveDateTime {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(epoch()),
            Value::Timestamp(ts) => Ok(ts),
            Value::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

impl TryFrom<Value> for NaiveDate {
    type Error = MetaError;

    fn try_from(value: Value) -> MetaResult<Self> {
        match value {
            Value::Null => Ok(epoch().date()),
            Value::Date(d) => Ok(d),
            Value::Timestamp(ts) => Ok(ts.date()),
            other => Err(mismatch("date", &other)),
        }
    }
}
