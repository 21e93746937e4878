//! Field descriptors: the storage type, default and conversions of one attribute.

use crate::app::registry::{ClassRef, Registry};
use crate::domain::model::value::{epoch, StorageValue, Value, DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::domain::model::{Entity, Persistable};
use crate::error::{MetaError, MetaResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use std::fmt;

/// Primary-key column present in every entity table.
pub const IDENTITY_COLUMN: &str = "identity";
/// Soft-delete column present in every entity table.
pub const DELETED_COLUMN: &str = "deleted";

/// Column type used in DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Text,
    Integer,
    Real,
    Boolean,
}

impl StorageType {
    pub fn sql(&self) -> &'static str {
        match self {
            StorageType::Text => "TEXT",
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Boolean => "BOOL",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// The referenced class of an object-reference field.
#[derive(Clone, Copy)]
pub struct ObjectClass {
    name: &'static str,
    blank: fn() -> Box<dyn Persistable>,
}

impl ObjectClass {
    pub fn of<E: Entity>() -> Self {
        Self {
            name: E::CLASS,
            blank: || Box::new(E::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// A fresh, unpersisted instance of the class.
    pub fn blank(&self) -> Box<dyn Persistable> {
        (self.blank)()
    }
}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectClass").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Boolean,
    /// Structured value kept as JSON text.
    Json,
    Timestamp,
    Date,
    Object(ObjectClass),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    kind: FieldKind,
    default: Value,
}

impl FieldDescriptor {
    fn new(kind: FieldKind, default: Value) -> Self {
        Self { kind, default }
    }

    pub fn text() -> Self {
        Self::new(FieldKind::Text, Value::Text(String::new()))
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer, Value::Integer(0))
    }

    pub fn real() -> Self {
        Self::new(FieldKind::Real, Value::Real(0.0))
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean, Value::Bool(false))
    }

    pub fn json() -> Self {
        Self::new(FieldKind::Json, Value::Json(JsonValue::Object(Default::default())))
    }

    pub fn timestamp() -> Self {
        Self::new(FieldKind::Timestamp, Value::Timestamp(epoch()))
    }

    pub fn date() -> Self {
        Self::new(FieldKind::Date, Value::Date(epoch().date()))
    }

    /// Reference to another entity, stored as its identity.
    pub fn object<E: Entity>() -> Self {
        Self::new(FieldKind::Object(ObjectClass::of::<E>()), Value::Null)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default_value(&self) -> Value {
        self.default.clone()
    }

    pub fn storage_type(&self) -> StorageType {
        match self.kind {
            FieldKind::Integer => StorageType::Integer,
            FieldKind::Real => StorageType::Real,
            FieldKind::Boolean => StorageType::Boolean,
            FieldKind::Text
            | FieldKind::Json
            | FieldKind::Timestamp
            | FieldKind::Date
            | FieldKind::Object(_) => StorageType::Text,
        }
    }

    /// Native value -> storage value.
    pub fn to_storage(&self, value: &Value) -> MetaResult<StorageValue> {
        if value.is_null() && !matches!(self.kind, FieldKind::Boolean) {
            return Ok(StorageValue::Null);
        }
        let stored = match self.kind {
            FieldKind::Text => match value {
                Value::Text(s) => StorageValue::Text(s.clone()),
                Value::Integer(i) => StorageValue::Text(i.to_string()),
                Value::Real(f) => StorageValue::Text(f.to_string()),
                Value::Bool(b) => StorageValue::Text(b.to_string()),
                other => return Err(self.mismatch(other)),
            },
            FieldKind::Integer => match value {
                Value::Integer(i) => StorageValue::Integer(*i),
                Value::Bool(b) => StorageValue::Integer(*b as i64),
                Value::Text(s) => match s.trim().parse::<i64>() {
                    Ok(i) => StorageValue::Integer(i),
                    Err(_) => return Err(self.mismatch(value)),
                },
                other => return Err(self.mismatch(other)),
            },
            FieldKind::Real => match value {
                Value::Real(f) => StorageValue::Real(*f),
                Value::Integer(i) => StorageValue::Real(*i as f64),
                other => return Err(self.mismatch(other)),
            },
            FieldKind::Boolean => {
                let truthy = match value {
                    Value::Null => false,
                    Value::Bool(b) => *b,
                    Value::Integer(i) => *i != 0,
                    other => return Err(self.mismatch(other)),
                };
                StorageValue::Integer(if truthy { 1 } else { 0 })
            }
            FieldKind::Json => match value {
                Value::Json(v) => StorageValue::Text(serde_json::to_string(v)?),
                other => return Err(self.mismatch(other)),
            },
            FieldKind::Timestamp | FieldKind::Date => {
                let ts = match value {
                    Value::Timestamp(ts) => *ts,
                    Value::Date(d) => d.and_time(chrono::NaiveTime::MIN),
                    Value::Text(s) => parse_timestamp(s).unwrap_or_else(|| self.default_timestamp()),
                    other => return Err(self.mismatch(other)),
                };
                let format = if matches!(self.kind, FieldKind::Date) {
                    DATE_FORMAT
                } else {
                    TIMESTAMP_FORMAT
                };
                StorageValue::Text(ts.format(format).to_string())
            }
            FieldKind::Object(_) => match value {
                Value::Object(obj) => match obj.identity() {
                    Some(id) => StorageValue::Text(id.to_string()),
                    None => StorageValue::Null,
                },
                Value::Text(id) => StorageValue::Text(id.clone()),
                other => return Err(self.mismatch(other)),
            },
        };
        Ok(stored)
    }

    /// Native value -> storage value for an exact-match filter.
    ///
    /// Unlike [`FieldDescriptor::to_storage`] nothing falls back to the default:
    /// text that does not parse for the column kind is bound as-is and matches
    /// no stored value.
    pub fn to_filter(&self, value: &Value) -> MetaResult<StorageValue> {
        let text = match value {
            Value::Null => return Ok(StorageValue::Null),
            Value::Text(text) => text,
            other => return self.to_storage(other),
        };
        let parsed = match self.kind {
            FieldKind::Integer => text.trim().parse::<i64>().ok().map(StorageValue::Integer),
            FieldKind::Real => text.trim().parse::<f64>().ok().map(StorageValue::Real),
            FieldKind::Boolean => match text.trim() {
                "1" => Some(StorageValue::Integer(1)),
                "0" => Some(StorageValue::Integer(0)),
                _ => None,
            },
            FieldKind::Timestamp => parse_timestamp(text)
                .map(|ts| StorageValue::Text(ts.format(TIMESTAMP_FORMAT).to_string())),
            FieldKind::Date => parse_timestamp(text)
                .map(|ts| StorageValue::Text(ts.format(DATE_FORMAT).to_string())),
            FieldKind::Text | FieldKind::Json | FieldKind::Object(_) => return self.to_storage(value),
        };
        Ok(parsed.unwrap_or_else(|| StorageValue::Text(text.clone())))
    }

    /// Storage value -> native value, for every kind except object references
    /// (those need the registry, see [`FieldDescriptor::decode`]).
    ///
    /// NULL always decodes to the default.
    pub fn from_storage(&self, raw: StorageValue) -> MetaResult<Value> {
        if raw.is_null() {
            return Ok(self.default_value());
        }
        let value = match self.kind {
            FieldKind::Text => Value::Text(raw.to_text().unwrap_or_default()),
            FieldKind::Integer => match raw {
                StorageValue::Integer(i) => Value::Integer(i),
                StorageValue::Real(f) => Value::Integer(f as i64),
                StorageValue::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .unwrap_or_else(|_| self.default_value()),
                StorageValue::Null => self.default_value(),
            },
            FieldKind::Real => match raw {
                StorageValue::Real(f) => Value::Real(f),
                StorageValue::Integer(i) => Value::Real(i as f64),
                StorageValue::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Real)
                    .unwrap_or_else(|_| self.default_value()),
                StorageValue::Null => self.default_value(),
            },
            FieldKind::Boolean => match raw {
                StorageValue::Integer(i) => Value::Bool(i == 1),
                StorageValue::Real(f) => Value::Bool(f == 1.0),
                StorageValue::Text(s) => Value::Bool(s.trim() == "1"),
                StorageValue::Null => self.default_value(),
            },
            FieldKind::Json => match raw {
                StorageValue::Text(s) => Value::Json(serde_json::from_str(&s)?),
                _ => self.default_value(),
            },
            FieldKind::Timestamp => match raw.to_text().as_deref().and_then(parse_timestamp) {
                Some(ts) => Value::Timestamp(ts),
                None => self.default_value(),
            },
            FieldKind::Date => match raw.to_text().as_deref().and_then(parse_timestamp) {
                Some(ts) => Value::Date(ts.date()),
                None => self.default_value(),
            },
            FieldKind::Object(class) => {
                return Err(MetaError::Configuration(format!(
                    "reference to '{}' must be decoded through the registry",
                    class.name()
                )))
            }
        };
        Ok(value)
    }

    /// Like [`FieldDescriptor::from_storage`], resolving object references through `registry`.
    ///
    /// A reference whose target row is missing decodes to a fresh default instance.
    pub async fn decode(&self, raw: StorageValue, registry: &Registry) -> MetaResult<Value> {
        let FieldKind::Object(class) = self.kind else {
            return self.from_storage(raw);
        };
        let Some(identity) = raw.to_text().filter(|id| !id.is_empty()) else {
            return Ok(self.default_value());
        };
        let table = registry
            .get_table(ClassRef::Name(class.name()))
            .await
            .ok_or_else(|| {
                MetaError::Configuration(format!("No table registered for class '{}'", class.name()))
            })?;
        match table.read_dyn(&identity).await {
            Ok(obj) => Ok(Value::Object(obj)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    class = class.name(),
                    identity = %identity,
                    "dangling reference, substituting a blank instance"
                );
                Ok(Value::Object(class.blank()))
            }
            Err(e) => Err(e),
        }
    }

    /// Plain JSON (as accepted by `load`) -> storage value.
    pub fn from_json(&self, value: &JsonValue) -> MetaResult<StorageValue> {
        let stored = match value {
            JsonValue::Null => StorageValue::Null,
            JsonValue::Bool(b) => StorageValue::Integer(*b as i64),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => StorageValue::Integer(i),
                None => StorageValue::Real(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => StorageValue::Text(s.clone()),
            JsonValue::Object(map) if matches!(self.kind, FieldKind::Object(_)) => {
                match map.get(IDENTITY_COLUMN).and_then(|v| v.as_str()) {
                    Some(id) => StorageValue::Text(id.to_string()),
                    None => StorageValue::Null,
                }
            }
            other => StorageValue::Text(serde_json::to_string(other)?),
        };
        Ok(stored)
    }

    fn default_timestamp(&self) -> NaiveDateTime {
        NaiveDateTime::try_from(self.default_value()).unwrap_or_else(|_| epoch())
    }

    fn mismatch(&self, value: &Value) -> MetaError {
        MetaError::Conversion(format!(
            "{:?} field cannot store a {} value",
            self.kind,
            value.type_name()
        ))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, ISO-8601 with `T`, RFC 3339 and bare dates.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in [
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_local());
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
}

/// Ordered `name -> descriptor` mapping; order fixes DDL column order.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    entries: Vec<(String, FieldDescriptor)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`FieldSet::insert`].
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Re-declaring a name replaces its descriptor in place.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: FieldDescriptor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = descriptor,
            None => self.entries.push((name, descriptor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a FieldDescriptor) -> &'a FieldDescriptor {
        self.get(name).unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
