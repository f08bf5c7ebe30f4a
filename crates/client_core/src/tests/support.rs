//! Scripted collaborators shared by the unit tests.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use shared::domain::{CatalogItem, ItemId, ItemStats};
use storage::DurableKv;
use tokio::sync::{Mutex, Semaphore};

use crate::{
    error::FetchError,
    remote::{CatalogListing, DetailRef, RemoteCatalogClient},
};

pub fn item(id: i64, name: &str) -> CatalogItem {
    CatalogItem {
        id: ItemId(id),
        name: name.to_string(),
        image_url: format!("https://img.example/{id}.png"),
        types: vec!["normal".to_string()],
        stats: ItemStats {
            hp: 10,
            attack: 20,
            defense: 30,
        },
    }
}

/// A catalog of `total` items with ids `1..=total`.
pub struct ScriptedCatalog {
    total: AtomicU32,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    fail_list: AtomicBool,
    failing_details: Mutex<HashSet<i64>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedCatalog {
    pub fn new(total: u32) -> Self {
        Self {
            total: AtomicU32::new(total),
            list_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            fail_list: AtomicBool::new(false),
            failing_details: Mutex::new(HashSet::new()),
            gate: None,
        }
    }

    /// Every list call waits for a permit on the returned semaphore.
    pub fn gated(total: u32) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut catalog = Self::new(total);
        catalog.gate = Some(Arc::clone(&gate));
        (catalog, gate)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Changes how many items the upstream catalog holds from now on.
    pub fn set_total(&self, total: u32) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn set_list_failure(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub async fn fail_detail(&self, id: i64) {
        self.failing_details.lock().await.insert(id);
    }

    pub async fn heal_detail(&self, id: i64) {
        self.failing_details.lock().await.remove(&id);
    }
}

#[async_trait]
impl RemoteCatalogClient for ScriptedCatalog {
    async fn list_page(&self, limit: u32, offset: u32) -> Result<CatalogListing, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| FetchError::Unavailable("gate closed".to_string()))?
                .forget();
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("list failed".to_string()));
        }

        let total = self.total.load(Ordering::SeqCst);
        let end = offset.saturating_add(limit).min(total);
        let entries = (offset..end)
            .map(|index| {
                let id = index + 1;
                DetailRef {
                    name: format!("item-{id}"),
                    detail_url: format!("mock://item/{id}"),
                }
            })
            .collect();
        Ok(CatalogListing {
            entries,
            has_more: end < total,
        })
    }

    async fn get_detail(&self, detail: &DetailRef) -> Result<CatalogItem, FetchError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let id: i64 = detail
            .detail_url
            .rsplit('/')
            .next()
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| FetchError::Unavailable(detail.detail_url.clone()))?;
        if self.failing_details.lock().await.contains(&id) {
            return Err(FetchError::Status {
                status: 500,
                url: detail.detail_url.clone(),
            });
        }
        Ok(item(id, &detail.name))
    }
}

/// Accepts reads from a fixed blob and rejects every write.
pub struct ReadOnlyKv {
    value: Option<Vec<u8>>,
    pub write_attempts: AtomicUsize,
}

impl ReadOnlyKv {
    pub fn new(value: Option<Vec<u8>>) -> Self {
        Self {
            value,
            write_attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DurableKv for ReadOnlyKv {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.value.clone())
    }

    async fn set(&self, key: &str, _value: &[u8]) -> anyhow::Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("storage is read-only: {key}"))
    }
}

/// Counts writes and otherwise behaves like an in-memory store.
#[derive(Default)]
pub struct CountingKv {
    inner: storage::MemoryKv,
    pub writes: AtomicUsize,
}

impl CountingKv {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.snapshot(key)
    }
}

#[async_trait]
impl DurableKv for CountingKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}
