//! Binding between one entity instance and its table row.

use crate::app::registry::Registry;
use crate::domain::model::{Entity, FieldDescriptor, StorageValue, DELETED_COLUMN, IDENTITY_COLUMN};
use crate::error::{MetaError, MetaResult};
use crate::storage::naming::{is_reserved, quote_ident};
use crate::storage::table::TableMeta;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Created by `Table::add`/`Table::read`; owned by exactly one entity.
#[derive(Clone)]
pub struct Record {
    table: Arc<TableMeta>,
    identity: Option<String>,
}

impl Record {
    pub(crate) fn new(table: Arc<TableMeta>, identity: Option<String>) -> Self {
        Self { table, identity }
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// Identity of the row this record last read or wrote.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_tracked(&self) -> bool {
        self.table.tracked
    }

    pub fn registry(&self) -> MetaResult<Arc<Registry>> {
        self.table.registry()
    }

    /// Loads the row matching the entity's identity into the entity.
    pub async fn read<E: Entity>(&self, entity: &mut E) -> MetaResult<()> {
        let identity = entity
            .base()
            .identity()
            .map(str::to_string)
            .ok_or_else(|| MetaError::NotFound(format!("{} without identity", E::CLASS)))?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            quote_ident(&self.table.name),
            quote_ident(IDENTITY_COLUMN)
        );
        let row = self
            .table
            .storage
            .fetch_optional(&sql, &[StorageValue::Text(identity.clone())])
            .await?
            .ok_or_else(|| {
                MetaError::NotFound(format!(
                    "{} '{}' in table '{}'",
                    E::CLASS,
                    identity,
                    self.table.name
                ))
            })?;

        let registry = self.registry()?;
        let fields = E::field_set();
        for (column, raw) in row {
            match column.as_str() {
                IDENTITY_COLUMN => entity.base_mut().set_identity(raw.to_text()),
                DELETED_COLUMN => {
                    let deleted = FieldDescriptor::boolean().from_storage(raw)?;
                    entity.base_mut().set_deleted(deleted.try_into()?);
                }
                name => match fields.get(name) {
                    Some(descriptor) => {
                        let value = descriptor.decode(raw, &registry).await?;
                        entity.set(name, value)?;
                    }
                    None => entity.base_mut().set_extra(name, raw.to_text()),
                },
            }
        }

        entity
            .base_mut()
            .bind(Record::new(self.table.clone(), Some(identity)));
        Ok(())
    }

    /// Persists every column of the entity: UPDATE when it has an identity,
    /// INSERT under `identity` (or a fresh UUID) otherwise.
    ///
    /// Returns the row identity.
    pub async fn write<E: Entity>(
        &self,
        entity: &mut E,
        identity: Option<String>,
    ) -> MetaResult<String> {
        let mut columns = vec![DELETED_COLUMN.to_string()];
        let mut params = vec![StorageValue::Integer(entity.base().is_deleted() as i64)];
        for (name, descriptor) in E::field_set().iter() {
            if is_reserved(name) {
                continue;
            }
            let value = match entity.get(name) {
                Some(value) if !value.is_null() => value,
                _ => descriptor.default_value(),
            };
            columns.push(name.to_string());
            params.push(descriptor.to_storage(&value)?);
        }

        let table = quote_ident(&self.table.name);
        let identity = match entity.base().identity().map(str::to_string) {
            Some(existing) => {
                let assignments = columns
                    .iter()
                    .map(|c| format!("{} = ?", quote_ident(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    table,
                    assignments,
                    quote_ident(IDENTITY_COLUMN)
                );
                params.push(StorageValue::Text(existing.clone()));
                if self.table.storage.execute(&sql, &params).await? == 0 {
                    return Err(MetaError::NotFound(format!(
                        "{} '{}' vanished from table '{}'",
                        E::CLASS,
                        existing,
                        self.table.name
                    )));
                }
                existing
            }
            None => {
                let identity = identity
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                columns.insert(0, IDENTITY_COLUMN.to_string());
                params.insert(0, StorageValue::Text(identity.clone()));
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    columns
                        .iter()
                        .map(|c| quote_ident(c))
                        .collect::<Vec<_>>()
                        .join(", "),
                    vec!["?"; columns.len()].join(", ")
                );
                self.table.storage.execute(&sql, &params).await?;
                entity.base_mut().set_identity(Some(identity.clone()));
                identity
            }
        };

        entity
            .base_mut()
            .bind(Record::new(self.table.clone(), Some(identity.clone())));
        Ok(identity)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table.name)
            .field("identity", &self.identity)
            .finish()
    }
}
