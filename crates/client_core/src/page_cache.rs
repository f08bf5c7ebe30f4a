//! Offset-keyed cache of catalog pages with single-flight fetching.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use futures::future::try_join_all;
use shared::domain::{CatalogItem, ItemId, Page};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{error::FetchError, remote::RemoteCatalogClient};

pub const DEFAULT_PAGE_SIZE: u32 = 6;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub page_size: u32,
    pub stale_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

struct CachedPage {
    page: Page,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    pages: BTreeMap<u32, CachedPage>,
    in_flight: Option<u32>,
    last_error: Option<String>,
}

impl CacheState {
    fn exhausted(&self) -> bool {
        self.pages
            .last_key_value()
            .is_some_and(|(_, cached)| !cached.page.has_more)
    }

    fn next_offset(&self) -> u32 {
        self.pages
            .last_key_value()
            .map(|(_, cached)| cached.page.next_offset)
            .unwrap_or(0)
    }

    fn item_count(&self) -> usize {
        self.pages.values().map(|cached| cached.page.items.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaginationSnapshot {
    pub page_count: usize,
    pub item_count: usize,
    pub is_fetching: bool,
    pub exhausted: bool,
    pub next_offset: u32,
    pub last_error: Option<String>,
}

pub struct PageCache {
    client: Arc<dyn RemoteCatalogClient>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

pub enum FetchStart {
    Cached(Page),
    Started(PendingFetch),
}

/// A page fetch that has claimed the single-flight slot.
pub struct PendingFetch {
    offset: u32,
    task: JoinHandle<Result<Page, FetchError>>,
}

impl PendingFetch {
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub async fn finish(self) -> Result<Page, FetchError> {
        let offset = self.offset;
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(FetchError::Unavailable(format!(
                "page fetch task for offset {offset} failed: {err}"
            ))),
        }
    }
}

/// Releases the single-flight slot even when the fetch task unwinds.
struct InFlightSlot {
    cache: Arc<PageCache>,
    offset: u32,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let mut state = self.cache.state();
        if state.in_flight == Some(self.offset) {
            state.in_flight = None;
        }
    }
}

impl PageCache {
    pub fn new(client: Arc<dyn RemoteCatalogClient>, config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            state: Mutex::new(CacheState::default()),
        })
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the page at `offset`, from cache while it is fresh.
    pub async fn fetch_page(self: &Arc<Self>, offset: u32) -> Result<Page, FetchError> {
        match self.start_fetch(offset)? {
            FetchStart::Cached(page) => Ok(page),
            FetchStart::Started(pending) => pending.finish().await,
        }
    }

    /// Claims the single-flight slot for `offset` and starts the network work
    /// on its own task. A fresh cached page is returned without claiming.
    ///
    /// Once this returns `Started`, [`PageCache::snapshot`] reports
    /// `is_fetching` until the fetch lands. Dropping the [`PendingFetch`] does
    /// not abort it; the result is still cached.
    pub fn start_fetch(self: &Arc<Self>, offset: u32) -> Result<FetchStart, FetchError> {
        {
            let mut state = self.state();
            if let Some(cached) = state.pages.get(&offset) {
                if cached.fetched_at.elapsed() < self.config.stale_after {
                    debug!(offset, "page cache: fresh hit");
                    return Ok(FetchStart::Cached(cached.page.clone()));
                }
            }
            if let Some(in_flight) = state.in_flight {
                debug!(offset, in_flight, "page cache: fetch coalesced");
                return Err(FetchError::InProgress { offset: in_flight });
            }
            if state.pages.contains_key(&offset) {
                debug!(offset, "page cache: stale entry, refetching");
            }
            state.in_flight = Some(offset);
        }

        let slot = InFlightSlot {
            cache: Arc::clone(self),
            offset,
        };
        let task = tokio::spawn(async move {
            let cache = Arc::clone(&slot.cache);
            let result =
                load_page(cache.client.as_ref(), cache.config.page_size, offset).await;
            cache.store_result(offset, &result);
            drop(slot);
            result
        });
        Ok(FetchStart::Started(PendingFetch { offset, task }))
    }

    fn store_result(&self, offset: u32, result: &Result<Page, FetchError>) {
        let mut state = self.state();
        match result {
            Ok(page) => {
                info!(
                    offset,
                    items = page.items.len(),
                    has_more = page.has_more,
                    "page cache: page fetched"
                );
                let mut page = page.clone();
                // Revealed items never disappear: a shorter refetch keeps the old tail.
                if let Some(previous) = state.pages.get(&offset) {
                    if previous.page.items.len() > page.items.len() {
                        debug!(
                            offset,
                            kept = previous.page.items.len() - page.items.len(),
                            "page cache: refetch came back shorter, keeping cached tail"
                        );
                        let tail = previous.page.items[page.items.len()..].to_vec();
                        page.items.extend(tail);
                    }
                }
                state.pages.insert(
                    offset,
                    CachedPage {
                        page,
                        fetched_at: Instant::now(),
                    },
                );
                state.last_error = None;
            }
            Err(err) => {
                warn!(offset, error = %err, "page cache: page discarded");
                state.last_error = Some(err.to_string());
            }
        }
    }

    /// Items of every cached page in offset order.
    pub fn all_cached_items(&self) -> Vec<CatalogItem> {
        self.state()
            .pages
            .values()
            .flat_map(|cached| cached.page.items.iter().cloned())
            .collect()
    }

    pub fn visible_items(&self, count: usize) -> Vec<CatalogItem> {
        self.state()
            .pages
            .values()
            .flat_map(|cached| cached.page.items.iter())
            .take(count)
            .cloned()
            .collect()
    }

    pub fn find_item(&self, id: ItemId) -> Option<CatalogItem> {
        self.state()
            .pages
            .values()
            .flat_map(|cached| cached.page.items.iter())
            .find(|item| item.id == id)
            .cloned()
    }

    pub fn cached_len(&self) -> usize {
        self.state().item_count()
    }

    pub fn has_more(&self) -> bool {
        !self.state().exhausted()
    }

    pub fn is_fetching(&self) -> bool {
        self.state().in_flight.is_some()
    }

    pub fn next_offset(&self) -> u32 {
        self.state().next_offset()
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        let state = self.state();
        PaginationSnapshot {
            page_count: state.pages.len(),
            item_count: state.item_count(),
            is_fetching: state.in_flight.is_some(),
            exhausted: state.exhausted(),
            next_offset: state.next_offset(),
            last_error: state.last_error.clone(),
        }
    }
}

async fn load_page(
    client: &dyn RemoteCatalogClient,
    page_size: u32,
    offset: u32,
) -> Result<Page, FetchError> {
    let listing = client.list_page(page_size, offset).await?;
    let items = try_join_all(listing.entries.iter().map(|entry| client.get_detail(entry))).await?;
    Ok(Page {
        offset,
        items,
        next_offset: offset.saturating_add(page_size),
        has_more: listing.has_more,
    })
}

#[cfg(test)]
#[path = "tests/page_cache_tests.rs"]
mod tests;
