//! Per-class table catalog: schema ensure/migration, add, read and select.

use crate::app::registry::{ClassRef, Registry};
use crate::domain::model::{
    Entity, FieldDescriptor, Persistable, StorageType, StorageValue, Value, DELETED_COLUMN,
    IDENTITY_COLUMN,
};
use crate::error::{MetaError, MetaResult};
use crate::storage::handle::StorageHandle;
use crate::storage::naming::{ensure_ident, is_reserved, quote_ident};
use crate::storage::record::Record;
use async_trait::async_trait;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::{Arc, Weak};

/// What every record of a table needs to reach the store and the registry.
pub(crate) struct TableMeta {
    pub(crate) name: String,
    pub(crate) class: &'static str,
    pub(crate) tracked: bool,
    pub(crate) storage: StorageHandle,
    pub(crate) registry: Weak<Registry>,
}

impl TableMeta {
    pub(crate) fn registry(&self) -> MetaResult<Arc<Registry>> {
        self.registry.upgrade().ok_or_else(|| {
            MetaError::Configuration(format!(
                "registry owning table '{}' has been dropped",
                self.name
            ))
        })
    }
}

/// Outcome of [`Table::ensure_schema`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaChanges {
    pub created: bool,
    pub added_columns: Vec<String>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        !self.created && self.added_columns.is_empty()
    }
}

pub struct Table<E> {
    meta: Arc<TableMeta>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Table<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.meta.name)
            .field("class", &self.meta.class)
            .field("tracked", &self.meta.tracked)
            .finish()
    }
}

impl<E: Entity> Table<E> {
    /// Binds the class to `name` and brings the physical schema up to date.
    pub(crate) async fn open(
        name: &str,
        tracked: bool,
        storage: StorageHandle,
        registry: Weak<Registry>,
    ) -> MetaResult<Self> {
        ensure_ident(name)?;
        let table = Self {
            meta: Arc::new(TableMeta {
                name: name.to_string(),
                class: E::CLASS,
                tracked,
                storage,
                registry,
            }),
            _entity: PhantomData,
        };
        table.ensure_schema().await?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn class_name(&self) -> &'static str {
        E::CLASS
    }

    pub fn is_tracked(&self) -> bool {
        self.meta.tracked
    }

    /// Creates the table if it is missing, otherwise adds any declared column
    /// the table lacks. Never drops or retypes. Running it twice is a no-op.
    pub async fn ensure_schema(&self) -> MetaResult<SchemaChanges> {
        let storage = &self.meta.storage;
        let table = quote_ident(&self.meta.name);
        let mut wanted = vec![(DELETED_COLUMN.to_string(), StorageType::Boolean)];
        for (name, descriptor) in E::field_set().iter() {
            if is_reserved(name) {
                continue;
            }
            ensure_ident(name)?;
            wanted.push((name.to_string(), descriptor.storage_type()));
        }

        let mut changes = SchemaChanges::default();
        let exists = storage
            .fetch_optional(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[StorageValue::Text(self.meta.name.clone())],
            )
            .await?
            .is_some();

        if !exists {
            let mut definitions = vec![format!("{} TEXT PRIMARY KEY", quote_ident(IDENTITY_COLUMN))];
            definitions.extend(
                wanted
                    .iter()
                    .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql())),
            );
            let sql = format!("CREATE TABLE {} ({})", table, definitions.join(", "));
            storage.execute(&sql, &[]).await?;
            tracing::info!(table = %self.meta.name, columns = definitions.len(), "table created");
            changes.created = true;
            return Ok(changes);
        }

        let existing = self.columns().await?;
        for (name, ty) in wanted {
            if existing.iter().any(|c| *c == name) {
                continue;
            }
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, quote_ident(&name), ty.sql());
            storage.execute(&sql, &[]).await?;
            tracing::info!(table = %self.meta.name, column = %name, "column added");
            changes.added_columns.push(name);
        }
        Ok(changes)
    }

    /// Physical column names in table order.
    pub async fn columns(&self) -> MetaResult<Vec<String>> {
        let rows = self
            .meta
            .storage
            .fetch_all(
                "SELECT name FROM pragma_table_info(?) ORDER BY cid",
                &[StorageValue::Text(self.meta.name.clone())],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(StorageValue::to_text))
            .collect())
    }

    /// A new entity with default field values, bound to this table but not yet stored.
    pub fn add(&self) -> MetaResult<E> {
        let mut entity = E::default();
        entity.set_defaults()?;
        entity.base_mut().bind(Record::new(self.meta.clone(), None));
        Ok(entity)
    }

    pub async fn read(&self, identity: &str) -> MetaResult<E> {
        let mut entity = E::default();
        entity.set_defaults()?;
        entity.base_mut().set_identity(Some(identity.to_string()));
        let record = Record::new(self.meta.clone(), Some(identity.to_string()));
        entity.base_mut().bind(record.clone());
        record.read(&mut entity).await?;
        Ok(entity)
    }

    /// Runs `query` and returns a cursor that reads one matching entity per step.
    pub async fn select(&self, query: Query) -> MetaResult<EntityCursor<E>> {
        let fields = E::field_set();
        let mut sql = format!(
            "SELECT {} FROM {}",
            quote_ident(IDENTITY_COLUMN),
            quote_ident(&self.meta.name)
        );
        let mut params = Vec::new();

        if !query.filters.is_empty() {
            let mut clauses = Vec::with_capacity(query.filters.len());
            for (column, value) in &query.filters {
                ensure_ident(column)?;
                let stored = match column.as_str() {
                    IDENTITY_COLUMN => FieldDescriptor::text().to_filter(value)?,
                    DELETED_COLUMN => FieldDescriptor::boolean().to_filter(value)?,
                    name => match fields.get(name) {
                        Some(descriptor) => descriptor.to_filter(value)?,
                        None => loose_storage(value)?,
                    },
                };
                if stored.is_null() {
                    clauses.push(format!("{} IS NULL", quote_ident(column)));
                } else {
                    clauses.push(format!("{} = ?", quote_ident(column)));
                    params.push(stored);
                }
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut order = Vec::new();
        for clause in &query.order_by {
            order.extend(OrderBy::parse_list(clause)?);
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(
                &order
                    .iter()
                    .map(OrderBy::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            params.push(StorageValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let identities = self
            .meta
            .storage
            .fetch_all(&sql, &params)
            .await?
            .iter()
            .filter_map(|row| row.get(IDENTITY_COLUMN).and_then(StorageValue::to_text))
            .collect();

        Ok(EntityCursor {
            table: self.clone(),
            identities,
        })
    }

    /// True when `class` names this table's entity class or is an instance of it.
    pub fn is_class(&self, class: ClassRef<'_>) -> bool {
        match class {
            ClassRef::Name(name) => name == E::CLASS,
            ClassRef::Entity(entity) => entity.as_any().is::<E>(),
        }
    }
}

/// Filter values on columns without a descriptor are bound as-is.
fn loose_storage(value: &Value) -> MetaResult<StorageValue> {
    match value {
        Value::Null => Ok(StorageValue::Null),
        Value::Integer(i) => Ok(StorageValue::Integer(*i)),
        Value::Real(f) => Ok(StorageValue::Real(*f)),
        Value::Bool(b) => Ok(StorageValue::Integer(*b as i64)),
        other => FieldDescriptor::text().to_storage(other),
    }
}

/// Exact-match filters, ordering and limit for [`Table::select`].
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order_by: Vec<String>,
    limit: Option<u64>,
}

impl Query {
    /// Matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column = value` to the conjunction. A null value matches `IS NULL`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// `"col"`, `"col DESC"` or a comma-separated list of those.
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    pub fn parse_list(clause: &str) -> MetaResult<Vec<Self>> {
        clause
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for OrderBy {
    type Err = MetaError;

    fn from_str(s: &str) -> MetaResult<Self> {
        let mut parts = s.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| MetaError::Configuration("empty ordering clause".to_string()))?;
        ensure_ident(column)?;
        let descending = match parts.next() {
            None => false,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
            Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
            Some(dir) => {
                return Err(MetaError::Configuration(format!(
                    "invalid ordering direction '{}'",
                    dir
                )))
            }
        };
        if let Some(extra) = parts.next() {
            return Err(MetaError::Configuration(format!(
                "unexpected '{}' in ordering clause '{}'",
                extra, s
            )));
        }
        Ok(Self {
            column: column.to_string(),
            descending,
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            quote_ident(&self.column),
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

/// Lazily hydrated result of a select. Identities are fetched up front;
/// each step reads one entity.
pub struct EntityCursor<E> {
    table: Table<E>,
    identities: VecDeque<String>,
}

impl<E: Entity> EntityCursor<E> {
    pub async fn fetch_next(&mut self) -> Option<MetaResult<E>> {
        let identity = self.identities.pop_front()?;
        Some(self.table.read(&identity).await)
    }

    pub async fn try_collect(mut self) -> MetaResult<Vec<E>> {
        let mut out = Vec::with_capacity(self.identities.len());
        while let Some(entity) = self.fetch_next().await {
            out.push(entity?);
        }
        Ok(out)
    }

    /// Remaining identities, in result order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Type-erased table, as the registry stores it.
#[async_trait]
pub trait TableHandle: Send + Sync {
    fn name(&self) -> &str;

    fn class_name(&self) -> &'static str;

    fn is_tracked(&self) -> bool;

    fn is_class(&self, class: ClassRef<'_>) -> bool;

    fn blank(&self) -> Box<dyn Persistable>;

    async fn read_dyn(&self, identity: &str) -> MetaResult<Box<dyn Persistable>>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<E: Entity> TableHandle for Table<E> {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn class_name(&self) -> &'static str {
        E::CLASS
    }

    fn is_tracked(&self) -> bool {
        self.meta.tracked
    }

    fn is_class(&self, class: ClassRef<'_>) -> bool {
        Table::is_class(self, class)
    }

    fn blank(&self) -> Box<dyn Persistable> {
        Box::new(E::default())
    }

    async fn read_dyn(&self, identity: &str) -> MetaResult<Box<dyn Persistable>> {
        Ok(Box::new(self.read(identity).await?))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_clauses_parse() {
        let parsed = OrderBy::parse_list("f_port DESC, name,  created asc").unwrap();
        assert_eq!(
            parsed,
            vec![OrderBy::desc("f_port"), OrderBy::asc("name"), OrderBy::asc("created")]
        );
        assert_eq!(parsed[0].to_string(), "\"f_port\" DESC");
    }

    #[test]
    fn ordering_rejects_injection() {
        assert!(OrderBy::parse_list("name; DROP TABLE x").is_err());
        assert!(OrderBy::parse_list("name sideways").is_err());
        assert!(OrderBy::parse_list("name desc extra").is_err());
    }

    #[test]
    fn schema_changes_report_emptiness() {
        assert!(SchemaChanges::default().is_empty());
        let added = SchemaChanges {
            created: false,
            added_columns: vec!["f_port".into()],
        };
        assert!(!added.is_empty());
    }
}
