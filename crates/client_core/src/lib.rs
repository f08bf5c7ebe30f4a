use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{CatalogItem, ItemId, ViewTab};
use storage::DurableKv;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

pub mod collection;
pub mod error;
pub mod page_cache;
pub mod remote;
pub mod reorder;
pub mod reveal;

pub use collection::{AddOutcome, CollectionStore, DEFAULT_COLLECTION_KEY};
pub use error::{CollectionError, FetchError};
pub use page_cache::{CacheConfig, FetchStart, PageCache, PaginationSnapshot, PendingFetch};
pub use remote::{
    CatalogListing, DetailRef, HttpCatalogClient, OfflineCatalogClient, RemoteCatalogClient,
};
pub use reorder::{
    ActivationConstraint, GestureOutcome, GestureState, Point, PointerEvent, ReorderConfig,
    ReorderSession,
};
pub use reveal::{RevealController, TriggerOutcome, DEFAULT_REVEAL_INCREMENT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogStatus {
    Loading,
    Ready,
    /// The very first page could not be loaded; replaces the catalog view.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogView {
    pub items: Vec<CatalogItem>,
    pub cached_count: usize,
    pub is_fetching: bool,
    pub exhausted: bool,
    pub reached_end: bool,
    pub status: CatalogStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Added { id: ItemId, name: String },
    AlreadyCollected { id: ItemId, name: String },
    Removed { id: ItemId, name: String },
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    CatalogUpdated(CatalogView),
    CollectionUpdated(Vec<CatalogItem>),
    ViewSwitched(ViewTab),
    Notice(Notice),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cache: CacheConfig,
    pub reveal_increment: usize,
    pub collection_key: String,
    pub reorder: ReorderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            reveal_increment: DEFAULT_REVEAL_INCREMENT,
            collection_key: DEFAULT_COLLECTION_KEY.to_string(),
            reorder: ReorderConfig::default(),
        }
    }
}

/// User intents the view layer can issue against a session.
#[async_trait]
pub trait CatalogHandle: Send + Sync {
    async fn on_sentinel_visible(&self) -> TriggerOutcome;
    async fn request_add(&self, item: CatalogItem) -> AddOutcome;
    async fn request_remove(&self, id: ItemId) -> bool;
    async fn pointer(&self, event: PointerEvent) -> GestureOutcome;
    async fn switch_view(&self, tab: ViewTab);
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

/// One browsing session: owns the page cache, the reveal state, the saved
/// collection and the reorder gesture tracker.
pub struct CatalogSession {
    pages: Arc<PageCache>,
    reveal: RevealController,
    collection: CollectionStore,
    gesture: Mutex<ReorderSession>,
    view: RwLock<ViewTab>,
    events: broadcast::Sender<ClientEvent>,
}

impl CatalogSession {
    pub async fn new(
        client: Arc<dyn RemoteCatalogClient>,
        kv: Arc<dyn DurableKv>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let collection = CollectionStore::load(kv, config.collection_key).await;
        Arc::new(Self {
            pages: PageCache::new(client, config.cache),
            reveal: RevealController::new(config.reveal_increment),
            collection,
            gesture: Mutex::new(ReorderSession::new(config.reorder)),
            view: RwLock::new(ViewTab::default()),
            events,
        })
    }

    pub fn pages(&self) -> &Arc<PageCache> {
        &self.pages
    }

    pub fn reveal(&self) -> &RevealController {
        &self.reveal
    }

    pub fn collection(&self) -> &CollectionStore {
        &self.collection
    }

    pub async fn active_view(&self) -> ViewTab {
        *self.view.read().await
    }

    pub async fn gesture_state(&self) -> GestureState {
        self.gesture.lock().await.state()
    }

    pub fn catalog_view(&self) -> CatalogView {
        let snapshot = self.pages.snapshot();
        let visible = self.reveal.visible_count();
        let status = match (&snapshot.last_error, snapshot.page_count) {
            (Some(err), 0) => CatalogStatus::Failed(err.clone()),
            (None, 0) => CatalogStatus::Loading,
            _ => CatalogStatus::Ready,
        };
        CatalogView {
            items: self.pages.visible_items(visible),
            cached_count: snapshot.item_count,
            is_fetching: snapshot.is_fetching,
            exhausted: snapshot.exhausted,
            reached_end: snapshot.exhausted && visible >= snapshot.item_count,
            status,
            last_error: snapshot.last_error,
        }
    }

    /// Looks up an item among the currently revealed catalog entries.
    pub fn visible_item(&self, id: ItemId) -> Option<CatalogItem> {
        self.pages
            .visible_items(self.reveal.visible_count())
            .into_iter()
            .find(|item| item.id == id)
    }

    pub async fn on_sentinel_visible(&self) -> TriggerOutcome {
        let trigger = self
            .reveal
            .on_trigger_with(&self.pages, || self.emit_catalog());
        match trigger.await {
            Ok(outcome) => {
                if outcome.changed_view() {
                    self.emit_catalog();
                }
                outcome
            }
            Err(err) => {
                warn!(error = %err, "session: page fetch failed");
                self.emit_catalog();
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                TriggerOutcome::Failed
            }
        }
    }

    pub async fn request_add(&self, item: CatalogItem) -> AddOutcome {
        let id = item.id;
        let name = item.name.clone();
        let outcome = self.collection.add(item).await;
        let notice = match outcome {
            AddOutcome::Added => {
                self.emit_collection().await;
                Notice::Added { id, name }
            }
            AddOutcome::Duplicate => Notice::AlreadyCollected { id, name },
        };
        let _ = self.events.send(ClientEvent::Notice(notice));
        outcome
    }

    pub async fn request_add_visible(&self, id: ItemId) -> Result<AddOutcome, CollectionError> {
        let item = self
            .visible_item(id)
            .ok_or(CollectionError::UnknownItem(id))?;
        Ok(self.request_add(item).await)
    }

    pub async fn request_remove(&self, id: ItemId) -> bool {
        let name = self
            .collection
            .items()
            .await
            .into_iter()
            .find(|item| item.id == id)
            .map(|item| item.name);
        let removed = self.collection.remove(id).await;
        if let (true, Some(name)) = (removed, name) {
            self.emit_collection().await;
            let _ = self
                .events
                .send(ClientEvent::Notice(Notice::Removed { id, name }));
        }
        removed
    }

    pub async fn move_entry(&self, from: usize, to: usize) -> Result<(), CollectionError> {
        self.collection.move_entry(from, to).await?;
        if from != to {
            self.emit_collection().await;
        }
        Ok(())
    }

    pub async fn pointer(&self, event: PointerEvent) -> GestureOutcome {
        let outcome = {
            let mut gesture = self.gesture.lock().await;
            gesture.handle(event, &self.collection).await
        };
        debug!(?outcome, "session: pointer event handled");
        if outcome.changed_collection() {
            self.emit_collection().await;
        }
        outcome
    }

    pub async fn switch_view(&self, tab: ViewTab) {
        {
            let mut view = self.view.write().await;
            if *view == tab {
                return;
            }
            *view = tab;
        }
        let _ = self.events.send(ClientEvent::ViewSwitched(tab));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn emit_catalog(&self) {
        let _ = self
            .events
            .send(ClientEvent::CatalogUpdated(self.catalog_view()));
    }

    async fn emit_collection(&self) {
        let items = self.collection.items().await;
        let _ = self.events.send(ClientEvent::CollectionUpdated(items));
    }
}

#[async_trait]
impl CatalogHandle for Arc<CatalogSession> {
    async fn on_sentinel_visible(&self) -> TriggerOutcome {
        CatalogSession::on_sentinel_visible(self).await
    }

    async fn request_add(&self, item: CatalogItem) -> AddOutcome {
        CatalogSession::request_add(self, item).await
    }

    async fn request_remove(&self, id: ItemId) -> bool {
        CatalogSession::request_remove(self, id).await
    }

    async fn pointer(&self, event: PointerEvent) -> GestureOutcome {
        CatalogSession::pointer(self, event).await
    }

    async fn switch_view(&self, tab: ViewTab) {
        CatalogSession::switch_view(self, tab).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        CatalogSession::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
