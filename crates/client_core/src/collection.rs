//! The user's saved items: ordered, unique by id, written through to durable
//! storage after every mutation.

use std::{collections::HashSet, sync::Arc};

use shared::domain::{CatalogItem, ItemId};
use storage::DurableKv;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::CollectionError;

pub const DEFAULT_COLLECTION_KEY: &str = "my_collection_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
}

pub struct CollectionStore {
    kv: Arc<dyn DurableKv>,
    key: String,
    items: Mutex<Vec<CatalogItem>>,
}

impl CollectionStore {
    /// Restores the collection stored under `key`. Missing or unreadable data
    /// yields an empty collection.
    pub async fn load(kv: Arc<dyn DurableKv>, key: impl Into<String>) -> Self {
        let key = key.into();
        let items = match kv.get(&key).await {
            Ok(Some(bytes)) => match decode_collection(&bytes) {
                Ok(items) => {
                    info!(key = %key, entries = items.len(), "collection: restored");
                    items
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "collection: stored data is malformed, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => {
                debug!(key = %key, "collection: nothing stored, starting empty");
                Vec::new()
            }
            Err(err) => {
                warn!(key = %key, error = %err, "collection: storage read failed, starting empty");
                Vec::new()
            }
        };

        Self {
            kv,
            key,
            items: Mutex::new(items),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn add(&self, item: CatalogItem) -> AddOutcome {
        let mut items = self.items.lock().await;
        if items.iter().any(|existing| existing.id == item.id) {
            debug!(id = item.id.0, "collection: duplicate add ignored");
            return AddOutcome::Duplicate;
        }
        items.push(item);
        self.persist(&items).await;
        AddOutcome::Added
    }

    /// Returns whether an entry was removed. Removing an absent id is a no-op.
    pub async fn remove(&self, id: ItemId) -> bool {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|item| item.id != id);
        let removed = items.len() != before;
        self.persist(&items).await;
        removed
    }

    pub async fn move_entry(&self, from: usize, to: usize) -> Result<(), CollectionError> {
        let mut items = self.items.lock().await;
        splice_move(&mut items, from, to).inspect_err(|err| {
            error!(from, to, error = %err, "collection: rejected move");
        })?;
        if from != to {
            self.persist(&items).await;
        }
        Ok(())
    }

    /// Moves the entry with `id` to `to`, returning the index it came from.
    pub async fn move_item(&self, id: ItemId, to: usize) -> Result<usize, CollectionError> {
        let mut items = self.items.lock().await;
        let from = items
            .iter()
            .position(|item| item.id == id)
            .ok_or(CollectionError::UnknownItem(id))?;
        splice_move(&mut items, from, to).inspect_err(|err| {
            error!(id = id.0, from, to, error = %err, "collection: rejected move");
        })?;
        if from != to {
            self.persist(&items).await;
        }
        Ok(from)
    }

    pub async fn items(&self) -> Vec<CatalogItem> {
        self.items.lock().await.clone()
    }

    pub async fn ids(&self) -> Vec<ItemId> {
        self.items.lock().await.iter().map(|item| item.id).collect()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.lock().await.iter().position(|item| item.id == id)
    }

    pub async fn contains(&self, id: ItemId) -> bool {
        self.index_of(id).await.is_some()
    }

    // Called with the item lock held so writes land in mutation order.
    async fn persist(&self, items: &[CatalogItem]) {
        let bytes = match serde_json::to_vec(items) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %self.key, error = %err, "collection: serialize failed, not persisted");
                return;
            }
        };
        if let Err(err) = self.kv.set(&self.key, &bytes).await {
            warn!(key = %self.key, error = %err, "collection: persist failed, keeping in-memory state");
        }
    }
}

fn splice_move(
    items: &mut Vec<CatalogItem>,
    from: usize,
    to: usize,
) -> Result<(), CollectionError> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
    }
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
    }
    Ok(())
}

fn decode_collection(bytes: &[u8]) -> Result<Vec<CatalogItem>, serde_json::Error> {
    let stored: Vec<CatalogItem> = serde_json::from_slice(bytes)?;
    let mut seen = HashSet::new();
    Ok(stored
        .into_iter()
        .filter(|item| seen.insert(item.id))
        .collect())
}

#[cfg(test)]
#[path = "tests/collection_tests.rs"]
mod tests;
