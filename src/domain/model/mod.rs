//! Domain model definitions for persistable entities.

use crate::app::registry::Registry;
use crate::error::{MetaError, MetaResult};
use crate::storage::record::Record;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod field;
pub mod setting;
pub mod value;

pub use field::{FieldDescriptor, FieldKind, FieldSet, StorageType, DELETED_COLUMN, IDENTITY_COLUMN};
pub use setting::{OptionDefault, OptionType, OptionValue, Setting};
pub use value::{StorageValue, Value};

/// Object-safe view of an entity.
///
/// Every [`Entity`] gets this for free; the change log, reference fields and the
/// registry's table lookup work through it without knowing the concrete class.
pub trait Persistable: fmt::Debug + Send + Sync + 'static {
    fn class_name(&self) -> &'static str;

    fn identity(&self) -> Option<&str>;

    fn is_deleted(&self) -> bool;

    /// Plain JSON mapping of `identity`, `deleted` and every field.
    /// With `deep = false` reference fields are flattened to the referenced identity.
    fn to_dict(&self, deep: bool) -> JsonValue;

    fn clone_boxed(&self) -> Box<dyn Persistable>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl Clone for Box<dyn Persistable> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// State every entity carries besides its own fields.
#[derive(Debug, Clone, Default)]
pub struct EntityBase {
    identity: Option<String>,
    deleted: bool,
    record: Option<Record>,
    /// Columns found in the row that the class does not declare.
    extra: BTreeMap<String, Option<String>>,
}

impl EntityBase {
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// The record binding; unbound entities cannot be read or written.
    pub fn record(&self) -> MetaResult<&Record> {
        self.record.as_ref().ok_or_else(|| MetaError::unbound("entity"))
    }

    pub fn is_bound(&self) -> bool {
        self.record.is_some()
    }

    pub fn extra(&self, column: &str) -> Option<&str> {
        self.extra.get(column).and_then(|v| v.as_deref())
    }

    pub fn extra_columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.extra.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub(crate) fn set_identity(&mut self, identity: Option<String>) {
        self.identity = identity.filter(|id| !id.is_empty());
    }

    pub(crate) fn bind(&mut self, record: Record) {
        self.record = Some(record);
    }

    pub(crate) fn set_extra(&mut self, column: &str, value: Option<String>) {
        self.extra.insert(column.to_string(), value);
    }
}

/// Options for [`Entity::write_with`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Identity to use when the entity is new (ignored for existing rows).
    pub identity: Option<String>,
    /// Register the write in the change log when the table is tracked.
    pub track: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            identity: None,
            track: true,
        }
    }
}

/// Contract for any persistable entity.
///
/// Implementors are plain structs with typed fields. [`Entity::field_set`] is
/// the descriptor table consulted by the generic persistence code (DDL,
/// row hydration, `load`, `to_dict`); `get`/`set` bridge between it and the
/// struct's fields.
///
/// `Default` must produce an unbound entity with no identity.
#[async_trait]
pub trait Entity: fmt::Debug + Clone + Default + Send + Sync + 'static {
    /// Class name, unique per entity type. Used for table routing and change-log keys.
    const CLASS: &'static str;

    fn field_set() -> FieldSet;

    fn get(&self, field: &str) -> Option<Value>;

    fn set(&mut self, field: &str, value: Value) -> MetaResult<()>;

    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    /// Class-specific checks run before every write. May normalize fields.
    async fn validate(&mut self, _registry: &Registry) -> MetaResult<()> {
        Ok(())
    }

    fn is_new(&self) -> bool {
        self.base().identity().is_none()
    }

    /// Soft delete; persisted by the next write. Rows are never removed.
    fn mark_deleted(&mut self) {
        self.base_mut().set_deleted(true);
    }

    /// Entities are equal when they share a non-empty identity.
    fn same_identity(&self, other: &Self) -> bool {
        match (self.base().identity(), other.base().identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn set_defaults(&mut self) -> MetaResult<()> {
        for (name, descriptor) in Self::field_set().iter() {
            self.set(name, descriptor.default_value())?;
        }
        Ok(())
    }

    /// The registry owning this entity's table.
    fn registry(&self) -> MetaResult<Arc<Registry>> {
        self.base().record()?.registry()
    }

    async fn read(&mut self) -> MetaResult<()> {
        let record = self.base().record()?.clone();
        record.read(self).await
    }

    async fn write(&mut self) -> MetaResult<()> {
        self.write_with(WriteOptions::default()).await
    }

    async fn write_with(&mut self, options: WriteOptions) -> MetaResult<()> {
        let record = self.base().record()?.clone();
        let registry = record.registry()?;
        self.validate(&registry).await?;
        record.write(self, options.identity).await?;
        if options.track && record.is_tracked() {
            registry.changes().set(&*self, false).await?;
        }
        Ok(())
    }

    /// Applies the keys present in `raw`; absent or null keys are left untouched.
    async fn load(&mut self, raw: &JsonMap<String, JsonValue>) -> MetaResult<()> {
        let registry = self.registry().ok();
        for (name, descriptor) in Self::field_set().iter() {
            let Some(json) = raw.get(name).filter(|v| !v.is_null()) else {
                continue;
            };
            let stored = descriptor.from_json(json)?;
            let value = match &registry {
                Some(registry) => descriptor.decode(stored, registry).await?,
                None => descriptor.from_storage(stored)?,
            };
            self.set(name, value)?;
        }
        Ok(())
    }
}

impl<E: Entity> Persistable for E {
    fn class_name(&self) -> &'static str {
        E::CLASS
    }

    fn identity(&self) -> Option<&str> {
        self.base().identity()
    }

    fn is_deleted(&self) -> bool {
        self.base().is_deleted()
    }

    fn to_dict(&self, deep: bool) -> JsonValue {
        let mut map = JsonMap::new();
        map.insert(
            IDENTITY_COLUMN.to_string(),
            self.base()
                .identity()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
        );
        map.insert(DELETED_COLUMN.to_string(), JsonValue::from(self.base().is_deleted()));
        for (column, value) in self.base().extra_columns() {
            map.insert(column.to_string(), value.map(JsonValue::from).unwrap_or(JsonValue::Null));
        }
        for name in E::field_set().names() {
            let value = self.get(name).unwrap_or(Value::Null);
            map.insert(name.to_string(), value.to_json(deep));
        }
        JsonValue::Object(map)
    }

    fn clone_boxed(&self) -> Box<dyn Persistable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
