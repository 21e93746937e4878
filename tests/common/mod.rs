//! Entity classes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rowkeeper::{
    Entity, EntityBase, FieldDescriptor, FieldSet, MetaError, MetaResult, Registry, Value,
};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

pub async fn open(dir: &Path) -> MetaResult<Arc<Registry>> {
    Registry::open_dir(dir).await
}

/// One field of every storage kind.
#[derive(Debug, Clone, Default)]
pub struct Widget {
    base: EntityBase,
    pub name: String,
    pub count: i64,
    pub ratio: f64,
    pub active: bool,
    pub meta: JsonValue,
    pub seen_at: NaiveDateTime,
    pub born_on: NaiveDate,
}

impl Entity for Widget {
    const CLASS: &'static str = "Widget";

    fn field_set() -> FieldSet {
        FieldSet::new()
            .field("name", FieldDescriptor::text())
            .field("count", FieldDescriptor::integer())
            .field("ratio", FieldDescriptor::real())
            .field("active", FieldDescriptor::boolean())
            .field("meta", FieldDescriptor::json())
            .field("seen_at", FieldDescriptor::timestamp())
            .field("born_on", FieldDescriptor::date())
    }

    fn get(&self, field: &str) -> Option<Value> {
        Some(match field {
            "name" => Value::from(self.name.as_str()),
            "count" => Value::from(self.count),
            "ratio" => Value::from(self.ratio),
            "active" => Value::from(self.active),
            "meta" => Value::from(self.meta.clone()),
            "seen_at" => Value::from(self.seen_at),
            "born_on" => Value::from(self.born_on),
            _ => return None,
        })
    }

    fn set(&mut self, field: &str, value: Value) -> MetaResult<()> {
        match field {
            "name" => self.name = value.try_into()?,
            "count" => self.count = value.try_into()?,
            "ratio" => self.ratio = value.try_into()?,
            "active" => self.active = value.try_into()?,
            "meta" => self.meta = value.try_into()?,
            "seen_at" => self.seen_at = value.try_into()?,
            "born_on" => self.born_on = value.try_into()?,
            other => return Err(MetaError::unknown_field(Self::CLASS, other)),
        }
        Ok(())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

/// `Widget` plus one column, used to exercise additive migration.
#[derive(Debug, Clone, Default)]
pub struct WidgetV2 {
    base: EntityBase,
    pub name: String,
    pub colour: String,
}

impl Entity for WidgetV2 {
    const CLASS: &'static str = "WidgetV2";

    fn field_set() -> FieldSet {
        FieldSet::new()
            .field("name", FieldDescriptor::text())
            .field("colour", FieldDescriptor::text().with_default("grey"))
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "name" => Some(Value::from(self.name.as_str())),
            "colour" => Some(Value::from(self.colour.as_str())),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> MetaResult<()> {
        match field {
            "name" => self.name = value.try_into()?,
            "colour" => self.colour = value.try_into()?,
            other => return Err(MetaError::unknown_field(Self::CLASS, other)),
        }
        Ok(())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

#[derive(Debug, Clone, Default)]
pub struct Client {
    base: EntityBase,
    pub name: String,
}

impl Entity for Client {
    const CLASS: &'static str = "Client";

    fn field_set() -> FieldSet {
        FieldSet::new().field("name", FieldDescriptor::text())
    }

    fn get(&self, field: &str) -> Option<Value> {
        (field == "name").then(|| Value::from(self.name.as_str()))
    }

    fn set(&mut self, field: &str, value: Value) -> MetaResult<()> {
        match field {
            "name" => self.name = value.try_into()?,
            other => return Err(MetaError::unknown_field(Self::CLASS, other)),
        }
        Ok(())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

/// A forwarded port owned by a client.
#[derive(Debug, Clone, Default)]
pub struct Port {
    base: EntityBase,
    pub f_port: i64,
    pub protocol: String,
    pub client: Option<Client>,
}

#[async_trait]
impl Entity for Port {
    const CLASS: &'static str = "Port";

    fn field_set() -> FieldSet {
        FieldSet::new()
            .field("f_port", FieldDescriptor::integer())
            .field("protocol", FieldDescriptor::text().with_default("tcp"))
            .field("client", FieldDescriptor::object::<Client>())
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "f_port" => Some(Value::from(self.f_port)),
            "protocol" => Some(Value::from(self.protocol.as_str())),
            "client" => Some(Value::from(
                self.client
                    .clone()
                    .map(|c| Box::new(c) as Box<dyn rowkeeper::Persistable>),
            )),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> MetaResult<()> {
        match field {
            "f_port" => self.f_port = value.try_into()?,
            "protocol" => self.protocol = value.try_into()?,
            "client" => self.client = value.into_entity::<Client>()?,
            other => return Err(MetaError::unknown_field(Self::CLASS, other)),
        }
        Ok(())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }

    async fn validate(&mut self, _registry: &Registry) -> MetaResult<()> {
        if !(1..=65535).contains(&self.f_port) {
            return Err(MetaError::Validation(format!(
                "port {} is out of range",
                self.f_port
            )));
        }
        self.protocol = self.protocol.to_lowercase();
        Ok(())
    }
}
