//! The storage handle: one SQLite connection shared by every table.

use crate::domain::model::StorageValue;
use crate::error::MetaResult;
use crate::infra::config::StoreConfig;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};

/// Owns the connection to the backing file.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct StorageHandle {
    pool: SqlitePool,
    path: PathBuf,
}

impl StorageHandle {
    /// Opens (creating if needed) the configured database file inside `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> MetaResult<Self> {
        Self::open_with(&StoreConfig::in_dir(dir.as_ref())).await
    }

    /// Opens the store described by the environment (`ROWKEEPER_DB_DIR`, ...).
    pub async fn from_env() -> MetaResult<Self> {
        Self::open_with(&StoreConfig::from_env()).await
    }

    pub async fn open_with(config: &StoreConfig) -> MetaResult<Self> {
        let path = config.path();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout);

        // A single connection: statements never run concurrently on our behalf.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "failed to open store");
                e
            })?;

        tracing::info!(path = %path.display(), "store opened");
        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs one statement and commits it. Returns the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[StorageValue]) -> MetaResult<u64> {
        tracing::debug!(sql, params = params.len(), "execute");
        let result = bind_all(sqlx::query(sql), params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&self, sql: &str, params: &[StorageValue]) -> MetaResult<Vec<RowMap>> {
        tracing::debug!(sql, params = params.len(), "fetch_all");
        let rows = bind_all(sqlx::query(sql), params).fetch_all(&self.pool).await?;
        rows.iter().map(RowMap::from_row).collect()
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[StorageValue],
    ) -> MetaResult<Option<RowMap>> {
        tracing::debug!(sql, params = params.len(), "fetch_optional");
        let row = bind_all(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(RowMap::from_row).transpose()
    }

    /// Closes the connection; later calls on any clone fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[StorageValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            StorageValue::Null => query.bind(None::<String>),
            StorageValue::Integer(i) => query.bind(*i),
            StorageValue::Real(f) => query.bind(*f),
            StorageValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// A fetched row as an ordered `column -> value` mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMap {
    columns: Vec<(String, StorageValue)>,
}

impl RowMap {
    fn from_row(row: &SqliteRow) -> MetaResult<Self> {
        let mut columns = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let raw = row.try_get_raw(idx)?;
            let value = if raw.is_null() {
                StorageValue::Null
            } else {
                // Dispatch on the stored value's own type, not the declared column type.
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => StorageValue::Integer(row.try_get::<i64, _>(idx)?),
                    "REAL" => StorageValue::Real(row.try_get::<f64, _>(idx)?),
                    "BLOB" => {
                        let bytes = row.try_get::<Vec<u8>, _>(idx)?;
                        StorageValue::Text(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    _ => StorageValue::Text(row.try_get::<String, _>(idx)?),
                }
            };
            columns.push((column.name().to_string(), value));
        }
        Ok(Self { columns })
    }

    pub fn get(&self, column: &str) -> Option<&StorageValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StorageValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for RowMap {
    type Item = (String, StorageValue);
    type IntoIter = std::vec::IntoIter<(String, StorageValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}
