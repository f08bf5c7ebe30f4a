//! Progressive reveal over the cached catalog.
//!
//! Each trigger (the view's sentinel scrolling into sight) either grows the
//! visible prefix from items that are already cached, or, once every cached
//! item is visible, asks the [`PageCache`] for the next page. A successful
//! fetch never grows the prefix by itself; the following trigger does.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tracing::debug;

use crate::{
    error::FetchError,
    page_cache::{FetchStart, PageCache, PaginationSnapshot},
};

pub const DEFAULT_REVEAL_INCREMENT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheView {
    pub cached_len: usize,
    pub is_fetching: bool,
    pub exhausted: bool,
    pub next_offset: u32,
}

impl From<&PaginationSnapshot> for CacheView {
    fn from(snapshot: &PaginationSnapshot) -> Self {
        Self {
            cached_len: snapshot.item_count,
            is_fetching: snapshot.is_fetching,
            exhausted: snapshot.exhausted,
            next_offset: snapshot.next_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStep {
    Reveal { from: usize, to: usize },
    FetchPage { offset: u32 },
    Idle,
}

/// Decides what one trigger does, given the visible count and the cache.
pub fn plan(visible: usize, increment: usize, view: CacheView) -> RevealStep {
    if visible < view.cached_len {
        let to = visible.saturating_add(increment.max(1)).min(view.cached_len);
        RevealStep::Reveal { from: visible, to }
    } else if !view.exhausted && !view.is_fetching {
        RevealStep::FetchPage {
            offset: view.next_offset,
        }
    } else {
        RevealStep::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Revealed { from: usize, to: usize },
    Fetched { offset: u32, items: usize },
    Coalesced,
    Idle,
    /// The page fetch failed; nothing was cached and the next trigger retries.
    Failed,
}

impl TriggerOutcome {
    pub fn changed_view(&self) -> bool {
        matches!(self, Self::Revealed { .. } | Self::Fetched { .. })
    }
}

pub struct RevealController {
    increment: usize,
    visible: AtomicUsize,
}

impl Default for RevealController {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INCREMENT)
    }
}

impl RevealController {
    pub fn new(increment: usize) -> Self {
        Self {
            increment: increment.max(1),
            visible: AtomicUsize::new(0),
        }
    }

    pub fn increment(&self) -> usize {
        self.increment
    }

    pub fn visible_count(&self) -> usize {
        self.visible.load(Ordering::Acquire)
    }

    /// Applies the reveal half of a trigger. Fetch decisions are returned to
    /// the caller untouched.
    pub fn step(&self, view: CacheView) -> RevealStep {
        let grown = self
            .visible
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |visible| {
                match plan(visible, self.increment, view) {
                    RevealStep::Reveal { to, .. } => Some(to),
                    _ => None,
                }
            });

        match grown {
            Ok(from) => plan(from, self.increment, view),
            Err(visible) => plan(visible, self.increment, view),
        }
    }

    pub async fn on_trigger(&self, cache: &Arc<PageCache>) -> Result<TriggerOutcome, FetchError> {
        self.on_trigger_with(cache, || {}).await
    }

    /// Like [`RevealController::on_trigger`], calling `on_fetch_started` once a
    /// page fetch has claimed the cache and before it is awaited.
    pub async fn on_trigger_with(
        &self,
        cache: &Arc<PageCache>,
        on_fetch_started: impl FnOnce(),
    ) -> Result<TriggerOutcome, FetchError> {
        let view = CacheView::from(&cache.snapshot());
        match self.step(view) {
            RevealStep::Reveal { from, to } => {
                debug!(from, to, "reveal: grew visible prefix");
                Ok(TriggerOutcome::Revealed { from, to })
            }
            RevealStep::FetchPage { offset } => {
                let page = match cache.start_fetch(offset) {
                    Ok(FetchStart::Cached(page)) => page,
                    Ok(FetchStart::Started(pending)) => {
                        on_fetch_started();
                        pending.finish().await?
                    }
                    Err(err) if err.is_in_progress() => return Ok(TriggerOutcome::Coalesced),
                    Err(err) => return Err(err),
                };
                Ok(TriggerOutcome::Fetched {
                    offset,
                    items: page.items.len(),
                })
            }
            RevealStep::Idle => Ok(TriggerOutcome::Idle),
        }
    }
}

#[cfg(test)]
#[path = "tests/reveal_tests.rs"]
mod tests;
