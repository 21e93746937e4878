//! In-memory log of entities with pending changes.
//!
//! Writes to tracked tables land here unsent. Whoever propagates them marks
//! entries sent once delivered and then clears them.

use crate::domain::model::{Entity, Persistable};
use crate::error::{MetaError, MetaResult};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::Mutex;

/// `"<class>/<identity>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeKey(String);

impl ChangeKey {
    pub fn new(class: &str, identity: &str) -> Self {
        Self(format!("{}/{}", class, identity))
    }

    /// `None` for entities that were never stored.
    pub fn of<P: Persistable + ?Sized>(entity: &P) -> Option<Self> {
        entity
            .identity()
            .map(|identity| Self::new(entity.class_name(), identity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<(&str, &str)> for ChangeKey {
    fn from((class, identity): (&str, &str)) -> Self {
        Self::new(class, identity)
    }
}

impl From<&str> for ChangeKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ChangeKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl<'a, E: Entity> From<&'a E> for ChangeKey {
    fn from(entity: &'a E) -> Self {
        Self::new(E::CLASS, entity.base().identity().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    entity: Box<dyn Persistable>,
    sent: bool,
}

#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Mutex<BTreeMap<ChangeKey, Entry>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a snapshot of `entity`, replacing any earlier entry for it.
    pub async fn set(&self, entity: &dyn Persistable, sent: bool) -> MetaResult<()> {
        let key = ChangeKey::of(entity).ok_or_else(|| {
            MetaError::Configuration(format!(
                "cannot log a change for an unsaved {}",
                entity.class_name()
            ))
        })?;
        tracing::debug!(key = %key, sent, "change logged");
        self.entries.lock().await.insert(
            key,
            Entry {
                entity: entity.clone_boxed(),
                sent,
            },
        );
        Ok(())
    }

    /// Flags the given entries as delivered. Unknown keys are ignored.
    pub async fn mark_sent<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<ChangeKey>,
    {
        let mut entries = self.entries.lock().await;
        let mut marked = 0;
        for key in keys {
            if let Some(entry) = entries.get_mut(&key.into()) {
                entry.sent = true;
                marked += 1;
            }
        }
        marked
    }

    /// Drops the given entries if they are marked sent; unsent entries stay.
    /// Returns how many were removed.
    pub async fn clear<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<ChangeKey>,
    {
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        for key in keys {
            let key = key.into();
            if entries.get(&key).is_some_and(|entry| entry.sent) {
                entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Snapshots filtered by class name and sent state, in key order.
    pub async fn select(
        &self,
        class: Option<&str>,
        sent: Option<bool>,
    ) -> std::vec::IntoIter<(Box<dyn Persistable>, bool)> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| class.map_or(true, |c| entry.entity.class_name() == c))
            .filter(|entry| sent.map_or(true, |s| entry.sent == s))
            .map(|entry| (entry.entity.clone(), entry.sent))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Typed [`ChangeLog::select`] for one entity class.
    pub async fn select_as<E: Entity>(&self, sent: Option<bool>) -> Vec<(E, bool)> {
        self.select(Some(E::CLASS), sent)
            .await
            .filter_map(|(entity, sent)| {
                entity
                    .into_any()
                    .downcast::<E>()
                    .ok()
                    .map(|entity| (*entity, sent))
            })
            .collect()
    }

    pub async fn get(&self, key: impl Into<ChangeKey>) -> Option<(Box<dyn Persistable>, bool)> {
        self.entries
            .lock()
            .await
            .get(&key.into())
            .map(|entry| (entry.entity.clone(), entry.sent))
    }

    pub async fn contains(&self, key: impl Into<ChangeKey>) -> bool {
        self.entries.lock().await.contains_key(&key.into())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
