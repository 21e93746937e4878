//! The process root: table catalog, option store and change log.

use crate::app::change_log::ChangeLog;
use crate::domain::model::{Entity, OptionDefault, OptionType, OptionValue, Persistable, Setting};
use crate::error::{MetaError, MetaResult};
use crate::infra::config::StoreConfig;
use crate::storage::handle::StorageHandle;
use crate::storage::table::{EntityCursor, Query, Table, TableHandle};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};

/// Table backing the option store.
pub const SETTINGS_TABLE: &str = "_setting";

/// A class given either by name or by one of its instances.
#[derive(Debug, Clone, Copy)]
pub enum ClassRef<'a> {
    Name(&'a str),
    Entity(&'a dyn Persistable),
}

impl<'a> From<&'a str> for ClassRef<'a> {
    fn from(name: &'a str) -> Self {
        ClassRef::Name(name)
    }
}

impl<'a> From<&'a dyn Persistable> for ClassRef<'a> {
    fn from(entity: &'a dyn Persistable) -> Self {
        ClassRef::Entity(entity)
    }
}

#[derive(Debug, Clone)]
struct CachedOption {
    raw: String,
    value_type: OptionType,
}

/// Owns every table registered against one store.
///
/// Always handled through `Arc`; tables keep a weak reference back so entities
/// can reach the change log and resolve references.
pub struct Registry {
    storage: StorageHandle,
    tables: RwLock<Vec<Arc<dyn TableHandle>>>,
    option_cache: Mutex<HashMap<String, CachedOption>>,
    changes: ChangeLog,
    self_ref: Weak<Registry>,
}

impl Registry {
    /// Wraps an open store and registers the settings table.
    pub async fn open(storage: StorageHandle) -> MetaResult<Arc<Self>> {
        let registry = Arc::new_cyclic(|self_ref| Self {
            storage,
            tables: RwLock::new(Vec::new()),
            option_cache: Mutex::new(HashMap::new()),
            changes: ChangeLog::new(),
            self_ref: self_ref.clone(),
        });
        registry.add_table::<Setting>(SETTINGS_TABLE, false).await?;
        Ok(registry)
    }

    /// Opens (creating if needed) the configured database file inside `dir`.
    pub async fn open_dir(dir: impl AsRef<Path>) -> MetaResult<Arc<Self>> {
        Self::open(StorageHandle::open(dir).await?).await
    }

    pub async fn open_with(config: &StoreConfig) -> MetaResult<Arc<Self>> {
        Self::open(StorageHandle::open_with(config).await?).await
    }

    pub async fn from_env() -> MetaResult<Arc<Self>> {
        Self::open(StorageHandle::from_env().await?).await
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// Registers `E` under table `name`, creating or migrating its schema.
    ///
    /// Registering a name again replaces the earlier table in place.
    pub async fn add_table<E: Entity>(&self, name: &str, tracked: bool) -> MetaResult<Arc<Table<E>>> {
        let table = Arc::new(Table::<E>::open(name, tracked, self.storage.clone(), self.self_ref.clone()).await?);
        let handle: Arc<dyn TableHandle> = table.clone();

        let mut tables = self.tables.write().await;
        match tables.iter_mut().find(|t| t.name() == name) {
            Some(slot) => *slot = handle,
            None => tables.push(handle),
        }
        tracing::debug!(table = name, class = E::CLASS, tracked, "table registered");
        Ok(table)
    }

    /// First registered table whose class matches.
    pub async fn get_table(&self, class: ClassRef<'_>) -> Option<Arc<dyn TableHandle>> {
        self.tables
            .read()
            .await
            .iter()
            .find(|t| t.is_class(class))
            .cloned()
    }

    /// Typed lookup by entity class.
    pub async fn table<E: Entity>(&self) -> Option<Arc<Table<E>>> {
        self.tables
            .read()
            .await
            .iter()
            .find_map(|t| t.clone().into_any().downcast::<Table<E>>().ok())
    }

    pub async fn table_named(&self, name: &str) -> Option<Arc<dyn TableHandle>> {
        self.tables
            .read()
            .await
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Table names in registration order.
    pub async fn table_names(&self) -> Vec<String> {
        self.tables
            .read()
            .await
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    pub async fn settings(&self) -> MetaResult<Arc<Table<Setting>>> {
        self.table::<Setting>()
            .await
            .ok_or_else(|| MetaError::Configuration("settings table is not registered".to_string()))
    }

    /// The stored option coerced by its type tag, or `None` if it was never set.
    ///
    /// Reads go through the cache; only the first read of a name hits the store.
    pub async fn get_option(&self, name: &str) -> MetaResult<Option<OptionValue>> {
        let mut cache = self.option_cache.lock().await;
        if let Some(cached) = cache.get(name) {
            return cached.value_type.coerce(&cached.raw).map(Some);
        }

        let Some(setting) = self.find_setting(name).await? else {
            return Ok(None);
        };
        let cached = CachedOption {
            value_type: OptionType::from_tag(&setting.value_type),
            raw: setting.value,
        };
        let value = cached.value_type.coerce(&cached.raw)?;
        cache.insert(name.to_string(), cached);
        Ok(Some(value))
    }

    /// Upserts an option by name and refreshes the cache.
    ///
    /// Without an explicit type the stored tag is kept, or derived from the value
    /// for a new option. `description` is left alone when `None`.
    pub async fn set_option(
        &self,
        name: &str,
        value: impl Into<OptionValue>,
        description: Option<&str>,
        value_type: Option<OptionType>,
    ) -> MetaResult<()> {
        let value = value.into();
        let mut cache = self.option_cache.lock().await;

        let mut setting = match self.find_setting(name).await? {
            Some(setting) => setting,
            None => {
                let mut setting = self.settings().await?.add()?;
                setting.name = name.to_string();
                setting
            }
        };

        let value_type = value_type
            .or_else(|| (!setting.value_type.is_empty()).then(|| OptionType::from_tag(&setting.value_type)))
            .unwrap_or_else(|| value.option_type());
        setting.value = value_type.render(&value);
        setting.value_type = value_type.tag().to_string();
        if let Some(description) = description {
            setting.description = description.to_string();
        }
        setting.write().await?;

        cache.insert(
            name.to_string(),
            CachedOption {
                raw: setting.value,
                value_type,
            },
        );
        Ok(())
    }

    /// Seeds options that are not stored yet; existing values win.
    /// Returns how many options were written.
    pub async fn init_settings<I, S>(&self, defaults: I) -> MetaResult<usize>
    where
        I: IntoIterator<Item = (S, OptionDefault)>,
        S: AsRef<str>,
    {
        let mut written = 0;
        for (name, default) in defaults {
            let name = name.as_ref();
            if self.find_setting(name).await?.is_some() {
                continue;
            }
            self.set_option(
                name,
                default.value,
                Some(&default.description),
                default.value_type,
            )
            .await?;
            written += 1;
        }
        if written > 0 {
            tracing::info!(written, "settings initialized");
        }
        Ok(written)
    }

    /// [`Registry::init_settings`] from a JSON object of
    /// `name -> {"value", "value_type", "description"}`.
    pub async fn init_settings_json(&self, defaults: &JsonValue) -> MetaResult<usize> {
        let defaults: BTreeMap<String, OptionDefault> = serde_json::from_value(defaults.clone())?;
        self.init_settings(defaults).await
    }

    /// Cursor over stored settings rows.
    pub async fn select_options(&self, query: Query) -> MetaResult<EntityCursor<Setting>> {
        self.settings().await?.select(query).await
    }

    async fn find_setting(&self, name: &str) -> MetaResult<Option<Setting>> {
        let mut cursor = self
            .settings()
            .await?
            .select(Query::new().eq("name", name).limit(1))
            .await?;
        cursor.fetch_next().await.transpose()
    }
}
