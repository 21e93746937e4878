//! The built-in `Setting` entity and the typed option values it stores.

use super::{Entity, EntityBase, FieldDescriptor, FieldSet, Value};
use crate::error::{MetaError, MetaResult};
use serde::Deserialize;
use std::fmt;

/// One row of the generic option store.
#[derive(Debug, Clone, Default)]
pub struct Setting {
    base: EntityBase,
    pub name: String,
    /// Raw stored text; see [`OptionType::coerce`].
    pub value: String,
    pub description: String,
    pub value_type: String,
}

impl Entity for Setting {
    const CLASS: &'static str = "Setting";

    fn field_set() -> FieldSet {
        FieldSet::new()
            .field("name", FieldDescriptor::text())
            .field("value", FieldDescriptor::text())
            .field("description", FieldDescriptor::text())
            .field("value_type", FieldDescriptor::text())
    }

    fn get(&self, field: &str) -> Option<Value> {
        let value = match field {
            "name" => &self.name,
            "value" => &self.value,
            "description" => &self.description,
            "value_type" => &self.value_type,
            _ => return None,
        };
        Some(Value::from(value.as_str()))
    }

    fn set(&mut self, field: &str, value: Value) -> MetaResult<()> {
        let slot = match field {
            "name" => &mut self.name,
            "value" => &mut self.value,
            "description" => &mut self.description,
            "value_type" => &mut self.value_type,
            other => return Err(MetaError::unknown_field(Self::CLASS, other)),
        };
        *slot = value.try_into()?;
        Ok(())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

/// Type tag stored in `value_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Bool,
    Int,
    #[default]
    #[serde(rename = "str")]
    Text,
}

impl OptionType {
    pub fn tag(&self) -> &'static str {
        match self {
            OptionType::Bool => "bool",
            OptionType::Int => "int",
            OptionType::Text => "str",
        }
    }

    /// Unknown or empty tags mean plain text.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "bool" => OptionType::Bool,
            "int" => OptionType::Int,
            _ => OptionType::Text,
        }
    }

    /// Stored text -> typed value. Booleans are true only for the literal `"1"`.
    pub fn coerce(&self, raw: &str) -> MetaResult<OptionValue> {
        match self {
            OptionType::Bool => Ok(OptionValue::Bool(raw == "1")),
            OptionType::Int => raw
                .trim()
                .parse::<i64>()
                .map(OptionValue::Int)
                .map_err(|_| MetaError::Conversion(format!("option value '{}' is not an integer", raw))),
            OptionType::Text => Ok(OptionValue::Text(raw.to_string())),
        }
    }

    /// Typed value -> stored text.
    pub fn render(&self, value: &OptionValue) -> String {
        match (self, value) {
            (OptionType::Bool, v) => (if v.is_truthy() { "1" } else { "0" }).to_string(),
            (OptionType::Int, OptionValue::Bool(b)) => (*b as i64).to_string(),
            (_, v) => v.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The type tag a value gets when none is given or stored.
    pub fn option_type(&self) -> OptionType {
        match self {
            OptionValue::Bool(_) => OptionType::Bool,
            OptionValue::Int(_) => OptionType::Int,
            OptionValue::Text(_) => OptionType::Text,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            OptionValue::Bool(b) => *b,
            OptionValue::Int(i) => *i != 0,
            OptionValue::Text(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

/// A seed entry for `Registry::init_settings`.
///
/// Deserializes from `{"value": .., "value_type": "int", "description": ".."}`;
/// a missing type is derived from the value.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionDefault {
    pub value: OptionValue,
    #[serde(default)]
    pub value_type: Option<OptionType>,
    #[serde(default)]
    pub description: String,
}

impl OptionDefault {
    pub fn new(
        value: impl Into<OptionValue>,
        value_type: OptionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            value_type: Some(value_type),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_follows_type_tag() {
        assert_eq!(OptionType::from_tag("bool").coerce("1").unwrap(), OptionValue::Bool(true));
        assert_eq!(OptionType::from_tag("bool").coerce("true").unwrap(), OptionValue::Bool(false));
        assert_eq!(OptionType::from_tag("int").coerce("42").unwrap(), OptionValue::Int(42));
        assert!(OptionType::Int.coerce("forty-two").is_err());
        assert_eq!(
            OptionType::from_tag("").coerce("anything").unwrap(),
            OptionValue::Text("anything".into())
        );
    }

    #[test]
    fn booleans_render_as_digits() {
        assert_eq!(OptionType::Bool.render(&OptionValue::Bool(true)), "1");
        assert_eq!(OptionType::Bool.render(&OptionValue::Text("0".into())), "0");
        assert_eq!(OptionType::Int.render(&OptionValue::Int(-3)), "-3");
        assert_eq!(OptionType::Text.render(&OptionValue::Bool(false)), "false");
    }

    #[test]
    fn defaults_deserialize_from_json() {
        let parsed: OptionDefault = serde_json::from_value(serde_json::json!({
            "value": 8,
            "value_type": "int",
            "description": "ports per client"
        }))
        .unwrap();
        assert_eq!(parsed.value, OptionValue::Int(8));
        assert_eq!(parsed.value_type, Some(OptionType::Int));

        let bare: OptionDefault =
            serde_json::from_value(serde_json::json!({"value": "hi"})).unwrap();
        assert_eq!(bare.value, OptionValue::Text("hi".into()));
        assert_eq!(bare.value_type, None);
        assert_eq!(bare.description, "");

        let tagged: OptionType = serde_json::from_value(serde_json::json!("str")).unwrap();
        assert_eq!(tagged, OptionType::Text);
        assert!(serde_json::from_value::<OptionType>(serde_json::json!("float")).is_err());
    }

    #[test]
    fn setting_rejects_unknown_fields() {
        let mut setting = Setting::default();
        setting.set("name", Value::from("min_port")).unwrap();
        assert_eq!(setting.name, "min_port");
        assert!(setting.set("colour", Value::from("red")).is_err());
    }
}
